/// Soundex-style phonetic fingerprints for sound-alike place names

/// Code returned for input without any letters
pub const DEGENERATE_CODE: &str = "0000";

const CODE_LEN: usize = 4;

fn digit(c: char) -> Option<char> {
    match c {
        'b' | 'f' | 'p' | 'v' => Some('1'),
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => Some('2'),
        'd' | 't' => Some('3'),
        'l' => Some('4'),
        'm' | 'n' => Some('5'),
        'r' => Some('6'),
        _ => None,
    }
}

/// Four-character code: first letter plus digit-mapped consonant groups.
///
/// Vowels, H, W and Y are dropped; consecutive repeats of the same digit
/// collapse to one. Vowels separate repeats, H and W do not. Non-ASCII letters
/// and other characters are ignored.
pub fn code(input: &str) -> String {
    let mut letters = input
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_alphabetic());

    let first = match letters.next() {
        Some(first) => first,
        None => return DEGENERATE_CODE.to_string(),
    };

    let mut out = String::with_capacity(CODE_LEN);
    out.push(first.to_ascii_uppercase());
    let mut last = digit(first);

    for c in letters {
        if out.len() == CODE_LEN {
            break;
        }
        match digit(c) {
            Some(d) => {
                if last != Some(d) {
                    out.push(d);
                }
                last = Some(d);
            }
            None if c == 'h' || c == 'w' => {}
            None => last = None,
        }
    }

    while out.len() < CODE_LEN {
        out.push('0');
    }
    out
}

/// Whether two codes denote a non-trivial phonetic match
pub fn matches(a: &str, b: &str) -> bool {
    a == b && a != DEGENERATE_CODE
}
