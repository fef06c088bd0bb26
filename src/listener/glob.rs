use regex::Regex;

/// Compiles a key-space glob (`*`, `?`, `[...]`, `\` escapes) into an
/// anchored regex.
pub fn compile_glob(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => re.push_str(&regex::escape(&escaped.to_string())),
                None => re.push_str(r"\\"),
            },
            '[' => {
                let mut class = String::from("[");
                let mut closed = false;
                let mut first = true;
                for c in chars.by_ref() {
                    match c {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '^' if first => class.push('^'),
                        '\\' | '[' | '&' | '~' => {
                            class.push('\\');
                            class.push(c);
                        }
                        other => class.push(other),
                    }
                    first = false;
                }
                if closed {
                    class.push(']');
                    re.push_str(&class);
                } else {
                    re.push_str(&regex::escape(&class));
                }
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}
