//! Best-effort repair of almost-JSON emitted by language models.
//!
//! The scanner walks the text once and re-emits it as compact JSON, fixing
//! the usual slips: single or typographic quotes, unquoted keys and values,
//! Python literals, trailing or missing commas, unescaped quotes and control
//! characters inside strings, stray closers and truncated output. The result
//! is only a candidate; callers still decode it and handle failure.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Key,
    Colon,
    Value,
}

#[derive(Debug, Clone, Copy)]
enum Frame {
    Object(Phase),
    Array,
}

pub fn repair_json(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut r = Repairer {
        out: String::with_capacity(input.len() + 16),
        stack: Vec::new(),
        value_done: false,
    };

    let mut i = 0;
    while i < chars.len() {
        // Anything after the first complete top-level value is noise.
        if r.stack.is_empty() && r.value_done {
            break;
        }
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '{' | '[' => {
                r.open(c);
                i += 1;
            }
            '}' | ']' => {
                r.close(c);
                i += 1;
            }
            ',' => {
                r.comma();
                i += 1;
            }
            ':' => {
                r.colon();
                i += 1;
            }
            '"' | '\'' | '\u{201C}' | '\u{2018}' => {
                let (s, next) = read_string(&chars, i);
                r.string(&s);
                i = next;
            }
            _ => {
                let key = r.expects_key();
                let (tok, next) = read_bare(&chars, i, key);
                r.bare(tok.trim(), key);
                i = next;
            }
        }
    }
    r.finish()
}

struct Repairer {
    out: String,
    stack: Vec<Frame>,
    value_done: bool,
}

impl Repairer {
    fn expects_key(&self) -> bool {
        matches!(self.stack.last(), Some(Frame::Object(Phase::Key)))
    }

    fn set_phase(&mut self, next: Phase) {
        if let Some(Frame::Object(phase)) = self.stack.last_mut() {
            *phase = next;
        }
    }

    fn before_value(&mut self) {
        match self.stack.last() {
            Some(Frame::Array) if self.value_done => self.out.push(','),
            Some(Frame::Object(Phase::Colon)) => {
                self.out.push(':');
                self.set_phase(Phase::Value);
            }
            _ => {}
        }
        self.value_done = false;
    }

    fn after_value(&mut self) {
        self.value_done = true;
        self.set_phase(Phase::Key);
    }

    fn key(&mut self, escaped: &str) {
        if self.value_done {
            self.out.push(',');
        }
        self.value_done = false;
        self.out.push('"');
        self.out.push_str(escaped);
        self.out.push('"');
        self.set_phase(Phase::Colon);
    }

    fn open(&mut self, c: char) {
        self.before_value();
        self.out.push(c);
        self.stack.push(if c == '{' {
            Frame::Object(Phase::Key)
        } else {
            Frame::Array
        });
    }

    fn close(&mut self, c: char) {
        let want_object = c == '}';
        let Some(pos) = self
            .stack
            .iter()
            .rposition(|f| matches!(f, Frame::Object(_)) == want_object)
        else {
            return;
        };
        while self.stack.len() > pos {
            self.close_top();
        }
    }

    fn close_top(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        match frame {
            Frame::Object(Phase::Colon) => self.out.push_str(":null"),
            Frame::Object(Phase::Value) => self.out.push_str("null"),
            _ => {
                if self.out.ends_with(',') {
                    self.out.pop();
                }
            }
        }
        self.out.push(match frame {
            Frame::Object(_) => '}',
            Frame::Array => ']',
        });
        self.after_value();
    }

    fn comma(&mut self) {
        match self.stack.last() {
            Some(Frame::Object(Phase::Colon)) => {
                self.out.push_str(":null");
                self.after_value();
            }
            Some(Frame::Object(Phase::Value)) => {
                self.out.push_str("null");
                self.after_value();
            }
            _ => {}
        }
        if self.value_done && !self.stack.is_empty() {
            self.out.push(',');
            self.value_done = false;
        }
    }

    fn colon(&mut self) {
        if matches!(self.stack.last(), Some(Frame::Object(Phase::Colon))) {
            self.out.push(':');
            self.set_phase(Phase::Value);
        }
    }

    fn string(&mut self, escaped: &str) {
        if self.expects_key() {
            self.key(escaped);
            return;
        }
        self.before_value();
        self.out.push('"');
        self.out.push_str(escaped);
        self.out.push('"');
        self.after_value();
    }

    fn bare(&mut self, tok: &str, key: bool) {
        if tok.is_empty() {
            return;
        }
        if key {
            self.key(&escape(tok));
            return;
        }
        let literal = match tok {
            "true" | "True" | "TRUE" => Some("true"),
            "false" | "False" | "FALSE" => Some("false"),
            "null" | "Null" | "NULL" | "None" | "none" | "nil" | "undefined" | "NaN" => {
                Some("null")
            }
            _ => None,
        };
        self.before_value();
        match literal {
            Some(l) => self.out.push_str(l),
            None if is_number(tok) => self.out.push_str(tok),
            None => {
                self.out.push('"');
                self.out.push_str(&escape(tok));
                self.out.push('"');
            }
        }
        self.after_value();
    }

    fn finish(mut self) -> String {
        while !self.stack.is_empty() {
            self.close_top();
        }
        self.out
    }
}

/// Reads a quoted string starting at `start` (the opening quote) and returns
/// its JSON-escaped contents plus the index after the closing quote.
fn read_string(chars: &[char], start: usize) -> (String, usize) {
    let closers: &[char] = match chars[start] {
        '\'' => &['\''],
        '\u{201C}' => &['\u{201D}', '"'],
        '\u{2018}' => &['\u{2019}', '\''],
        _ => &['"'],
    };
    let mut s = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            match chars.get(i + 1).copied() {
                Some(n) if matches!(n, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => {
                    s.push('\\');
                    s.push(n);
                    i += 2;
                }
                Some('u') if is_hex4(chars, i + 2) => {
                    s.push_str("\\u");
                    s.extend(&chars[i + 2..i + 6]);
                    i += 6;
                }
                Some('\'') => {
                    s.push('\'');
                    i += 2;
                }
                _ => {
                    s.push_str("\\\\");
                    i += 1;
                }
            }
            continue;
        }
        if closers.contains(&c) && closes_string(chars, i + 1) {
            return (s, i + 1);
        }
        push_escaped(&mut s, c);
        i += 1;
    }
    (s, i)
}

/// A quote ends the string only when what follows looks like JSON structure;
/// otherwise it is an unescaped quote inside the text.
fn closes_string(chars: &[char], from: usize) -> bool {
    let mut saw_newline = false;
    for &c in &chars[from..] {
        match c {
            ' ' | '\t' => {}
            '\n' | '\r' => saw_newline = true,
            ',' | '}' | ']' | ':' => return true,
            '"' | '\'' | '\u{201C}' | '\u{2018}' | '{' | '[' if saw_newline => return true,
            _ => return false,
        }
    }
    true
}

fn read_bare(chars: &[char], start: usize, key: bool) -> (String, usize) {
    let mut end = start;
    while end < chars.len() {
        let c = chars[end];
        if matches!(c, ',' | '}' | ']' | '\n' | '\r')
            || (key && matches!(c, ':' | '{' | '[' | '"'))
        {
            break;
        }
        end += 1;
    }
    // The first char is never a stop char, so this always advances.
    (chars[start..end].iter().collect(), end.max(start + 1))
}

fn is_hex4(chars: &[char], from: usize) -> bool {
    chars.len() >= from + 4 && chars[from..from + 4].iter().all(char::is_ascii_hexdigit)
}

fn is_number(tok: &str) -> bool {
    serde_json::from_str::<serde_json::Number>(tok).is_ok()
}

fn push_escaped(s: &mut String, c: char) {
    match c {
        '"' => s.push_str("\\\""),
        '\\' => s.push_str("\\\\"),
        '\n' => s.push_str("\\n"),
        '\r' => s.push_str("\\r"),
        '\t' => s.push_str("\\t"),
        c if (c as u32) < 0x20 => s.push_str(&format!("\\u{:04x}", c as u32)),
        c => s.push(c),
    }
}

fn escape(raw: &str) -> String {
    let mut s = String::with_capacity(raw.len());
    for c in raw.chars() {
        push_escaped(&mut s, c);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn fixed(input: &str) -> Value {
        let out = repair_json(input);
        serde_json::from_str(&out).unwrap_or_else(|e| panic!("{out:?} still invalid: {e}"))
    }

    #[test]
    fn valid_json_keeps_meaning() {
        let input = r#"[{"issue": "a", "n": [1, 2.5, -3], "ok": true, "x": null}]"#;
        assert_eq!(fixed(input), serde_json::from_str::<Value>(input).unwrap());
    }

    #[test]
    fn trailing_and_double_commas() {
        assert_eq!(fixed(r#"[{"a": 1,,}, ]"#), json!([{"a": 1}]));
    }

    #[test]
    fn single_quotes_and_bare_keys() {
        assert_eq!(
            fixed("[{issue: 'Missing alt', 'priority': 'high'}]"),
            json!([{"issue": "Missing alt", "priority": "high"}])
        );
    }

    #[test]
    fn python_literals() {
        assert_eq!(
            fixed(r#"[{"a": True, "b": None, "c": False}]"#),
            json!([{"a": true, "b": null, "c": false}])
        );
    }

    #[test]
    fn bare_values_become_strings() {
        assert_eq!(
            fixed(r#"[{"impact": high, "n": 007}]"#),
            json!([{"impact": "high", "n": "007"}])
        );
    }

    #[test]
    fn missing_commas_across_lines() {
        let input = "[{\"a\": \"x\"\n \"b\": \"y\"}\n{\"a\": \"z\"}]";
        assert_eq!(fixed(input), json!([{"a": "x", "b": "y"}, {"a": "z"}]));
    }

    #[test]
    fn unescaped_inner_quotes() {
        assert_eq!(
            fixed(r#"[{"issue": "Use "alt" text"}]"#),
            json!([{"issue": "Use \"alt\" text"}])
        );
    }

    #[test]
    fn control_chars_in_strings() {
        assert_eq!(
            fixed("[{\"a\": \"line1\nline2\tend\"}]"),
            json!([{"a": "line1\nline2\tend"}])
        );
    }

    #[test]
    fn typographic_quotes() {
        assert_eq!(
            fixed("[{\u{201C}issue\u{201D}: \u{201C}Low contrast\u{201D}}]"),
            json!([{"issue": "Low contrast"}])
        );
    }

    #[test]
    fn invalid_escape_keeps_backslash() {
        assert_eq!(fixed(r#"["C:\path", "it\'s"]"#), json!(["C:\\path", "it's"]));
    }

    #[test]
    fn truncated_output_is_closed() {
        assert_eq!(
            fixed(r#"[{"issue": "Missing alt", "how"#),
            json!([{"issue": "Missing alt", "how": null}])
        );
        assert_eq!(fixed(r#"[{"a":"#), json!([{"a": null}]));
        assert_eq!(fixed(r#"[{"a": "unterminated"#), json!([{"a": "unterminated"}]));
    }

    #[test]
    fn stray_closers_and_trailing_noise() {
        assert_eq!(fixed(r#"[{"a": 1}}] and more"#), json!([{"a": 1}]));
    }
}
