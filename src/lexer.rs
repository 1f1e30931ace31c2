//! Small hand-written character-stream primitives shared by the content
//! hasher (docstring stripping) and the symbol graph builder (macro-test
//! call extraction). Deliberately not a parser: these only locate spans in
//! a `&[char]` buffer, they never build a tree.

/// Given the index of an opening `"`, returns the index just past the
/// matching closing `"`. A `\` protects the following character from being
/// treated as a terminator. Runs to the end of input on an unterminated
/// literal rather than panicking.
pub fn string_literal_end(chars: &[char], quote_idx: usize) -> usize {
    debug_assert_eq!(chars.get(quote_idx), Some(&'"'));
    let mut i = quote_idx + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

/// Given the index of an opening `(`, `[`, or `{`, returns the index just
/// past the matching close delimiter. Tracks a single nesting depth across
/// all three bracket families (Lisp-like source nests consistently, so this
/// is enough to find the end of a top-level form) and skips over string
/// literals. Runs to end of input if unmatched.
pub fn matching_close(chars: &[char], open_idx: usize) -> usize {
    let mut depth: i32 = 0;
    let mut i = open_idx;
    while i < chars.len() {
        match chars[i] {
            '"' => {
                i = string_literal_end(chars, i);
                continue;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    chars.len()
}

/// Advances past a maximal run of whitespace starting at `start`.
pub fn skip_ws(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

/// Advances to the end of a bare token: a maximal run of characters that
/// are neither whitespace nor one of the bracket/quote delimiters.
pub fn read_token_end(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while i < chars.len() && !is_delimiter(chars[i]) {
        i += 1;
    }
    i
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"')
}
