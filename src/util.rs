// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::path::Path;

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Formats a position in seconds as minutes:seconds.tenths, the way a deck display shows it.
/// Negative and non-finite values show as zero.
pub fn deck_time(seconds: f64) -> String {
    let tenths = if seconds.is_finite() {
        (seconds.max(0.0) * 10.0).floor() as u64
    } else {
        0
    };
    let minutes = tenths / 600;
    let secs = (tenths % 600) / 10;
    format!("{}:{:02}.{}", minutes, secs, tenths % 10)
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use crate::util::{deck_time, filename_display};

    #[test]
    fn test_deck_time() {
        assert_eq!("0:00.0", deck_time(0.0));
        assert_eq!("0:05.2", deck_time(5.25));
        assert_eq!("0:55.0", deck_time(55.0));
        assert_eq!("1:00.0", deck_time(60.0));
        assert_eq!("2:05.9", deck_time(125.99));
        assert_eq!("60:06.0", deck_time(3606.0));
        assert_eq!("0:00.0", deck_time(-3.0));
        assert_eq!("0:00.0", deck_time(f64::NAN));
    }

    #[test]
    fn test_filename_display() {
        assert_eq!("kick.wav", filename_display(Path::new("/sounds/kick.wav")));
        assert_eq!("unreadable file name", filename_display(Path::new("/")));
    }
}
