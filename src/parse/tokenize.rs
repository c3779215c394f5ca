use std::borrow::Cow;

/// Reserved words that only introduce the command that follows them.
const LEADING_KEYWORDS: &[&str] = &["if", "then", "else", "elif", "do", "while", "until", "!", "{", "("];

/// The part of a segment that rules are matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandText {
    /// Normalized command text: keywords and env assignments stripped,
    /// shell quoting removed, words joined by single spaces.
    pub text: String,
    /// Leading `NAME=value` assignments that were stripped.
    pub env_vars: Vec<(String, String)>,
}

/// Compute the command text of a segment.
pub fn command_text(raw: &str) -> CommandText {
    let rest = strip_keywords(raw);
    let (env_vars, rest) = split_env_vars(rest);
    CommandText {
        text: normalize_command(rest),
        env_vars,
    }
}

/// Strip leading shell keywords such as `then` or `do`.
///
/// `(` and `{` may be glued to the command (`(cd /tmp`), the word keywords
/// must be followed by whitespace.
pub fn strip_keywords(command: &str) -> &str {
    let mut rest = command.trim_start();
    'outer: loop {
        for kw in LEADING_KEYWORDS {
            let Some(after) = rest.strip_prefix(kw) else {
                continue;
            };
            let glued_ok = matches!(*kw, "(" | "{" | "!");
            if after.is_empty() || after.starts_with(char::is_whitespace) || glued_ok {
                rest = after.trim_start();
                continue 'outer;
            }
        }
        break;
    }
    rest
}

/// Whether `name` is a valid shell variable name.
fn is_var_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
}

/// Split leading KEY=VALUE pairs off a command string.
///
/// Values may be quoted (`FOO="bar baz" cmd`); the value ends at the first
/// whitespace outside quotes. Returns the pairs and the remaining command.
pub fn split_env_vars(command: &str) -> (Vec<(String, String)>, &str) {
    let mut result = Vec::new();
    let mut rest = command.trim_start();
    loop {
        let Some(eq_pos) = rest.find('=') else {
            break;
        };
        let key = &rest[..eq_pos];
        if !is_var_name(key) {
            break;
        }
        let after_eq = &rest[eq_pos + 1..];
        let Some(end) = unquoted_word_end(after_eq) else {
            break;
        };
        // An assignment with nothing after it is a plain assignment statement,
        // not a prefix to a command.
        let remaining = after_eq[end..].trim_start();
        if remaining.is_empty() {
            break;
        }
        let value = strip_quotes(&after_eq[..end]);
        result.push((key.to_string(), value));
        rest = remaining;
    }
    (result, rest)
}

/// Byte offset of the first unquoted whitespace in `s`, or `s.len()`.
/// `None` if a quote is left open.
fn unquoted_word_end(s: &str) -> Option<usize> {
    let (mut sq, mut dq, mut esc) = (false, false, false);
    for (i, c) in s.char_indices() {
        if esc {
            esc = false;
            continue;
        }
        match c {
            '\\' if !sq => esc = true,
            '\'' if !dq => sq = !sq,
            '"' if !sq => dq = !dq,
            c if c.is_whitespace() && !sq && !dq => return Some(i),
            _ => {}
        }
    }
    if sq || dq { None } else { Some(s.len()) }
}

fn strip_quotes(value: &str) -> String {
    shlex::split(value)
        .and_then(|mut words| if words.len() == 1 { words.pop() } else { None })
        .unwrap_or_else(|| value.to_string())
}

/// Collapse runs of unquoted whitespace into a single space and trim.
///
/// `rm  -rf` and `rm -rf` must match the same rules; whitespace inside
/// quotes is significant and left alone.
fn normalize_whitespace(command: &str) -> String {
    let mut out = String::with_capacity(command.len());
    let (mut sq, mut dq, mut esc) = (false, false, false);
    let mut pending_space = false;
    for c in command.trim().chars() {
        if esc {
            out.push(c);
            esc = false;
            continue;
        }
        if c.is_whitespace() && !sq && !dq {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        match c {
            '\\' if !sq => esc = true,
            '\'' if !dq => sq = !sq,
            '"' if !sq => dq = !dq,
            _ => {}
        }
        out.push(c);
    }
    out
}

/// Rewrite `command` as its shell words joined by single spaces.
///
/// Quotes and escapes are removed, so `'rm'`, `\rm` and `r""m` all read
/// `rm`. A word that contains whitespace or is empty is quoted again to keep
/// its boundaries. Text shlex cannot split is only whitespace-normalized.
pub fn normalize_command(command: &str) -> String {
    let Some(words) = shlex::split(command) else {
        return normalize_whitespace(command);
    };
    words
        .iter()
        .map(|word| {
            if word.is_empty() || word.contains(char::is_whitespace) {
                shlex::try_quote(word).map_or_else(|_| word.clone(), Cow::into_owned)
            } else {
                word.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokenize a command segment into words using shlex (POSIX word splitting).
pub fn tokenize(command: &str) -> Vec<String> {
    shlex::split(command).unwrap_or_else(|| {
        // Fallback: simple whitespace splitting if shlex can't parse
        command.split_whitespace().map(String::from).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_text_plain() {
        let ct = command_text("ls -la");
        assert_eq!(ct.text, "ls -la");
        assert!(ct.env_vars.is_empty());
    }

    #[test]
    fn command_text_with_env() {
        let ct = command_text("GIT_CONFIG_GLOBAL=~/.gitconfig.ai git push");
        assert_eq!(ct.text, "git push");
        assert_eq!(
            ct.env_vars,
            vec![("GIT_CONFIG_GLOBAL".into(), "~/.gitconfig.ai".into())]
        );
    }

    #[test]
    fn command_text_quoted_env_value() {
        let ct = command_text("FOO=\"bar baz\" cmd --flag");
        assert_eq!(ct.text, "cmd --flag");
        assert_eq!(ct.env_vars, vec![("FOO".into(), "bar baz".into())]);
    }

    #[test]
    fn bare_assignment_is_not_stripped() {
        let ct = command_text("FOO=bar");
        assert_eq!(ct.text, "FOO=bar");
        assert!(ct.env_vars.is_empty());
    }

    #[test]
    fn keywords_stripped() {
        assert_eq!(command_text("then rm -rf /").text, "rm -rf /");
        assert_eq!(command_text("do shred \"$i\"").text, "shred $i");
        assert_eq!(command_text("if ! grep -q x f").text, "grep -q x f");
        assert_eq!(command_text("(cd /tmp").text, "cd /tmp");
    }

    #[test]
    fn keyword_prefix_of_word_not_stripped() {
        assert_eq!(command_text("done").text, "done");
        assert_eq!(command_text("iffy --run").text, "iffy --run");
        assert_eq!(command_text("dotnet build").text, "dotnet build");
    }

    #[test]
    fn whitespace_collapsed_outside_quotes() {
        assert_eq!(normalize_whitespace("  rm   -rf\t/tmp "), "rm -rf /tmp");
        assert_eq!(normalize_whitespace("echo 'a   b'"), "echo 'a   b'");
        assert_eq!(normalize_whitespace("echo \"a   b\"  c"), "echo \"a   b\" c");
    }

    #[test]
    fn quoting_removed_from_command_name() {
        assert_eq!(command_text("'rm' -rf /").text, "rm -rf /");
        assert_eq!(command_text("\\rm -rf /").text, "rm -rf /");
        assert_eq!(command_text("r\"\"m -rf /").text, "rm -rf /");
        assert_eq!(command_text("\"git\"   'push'").text, "git push");
    }

    #[test]
    fn quoted_words_keep_their_boundaries() {
        assert_eq!(command_text("grep 'a   b' file").text, "grep 'a   b' file");
        assert_eq!(command_text("rm '-rf /'").text, "rm '-rf /'");
        assert_eq!(command_text("echo '' x").text, "echo '' x");
    }

    #[test]
    fn env_stripped_before_unquoting() {
        let ct = command_text("FOO='a b' 'rm' -rf /");
        assert_eq!(ct.text, "rm -rf /");
        assert_eq!(ct.env_vars, vec![("FOO".into(), "a b".into())]);
    }

    #[test]
    fn unsplittable_text_is_whitespace_normalized() {
        assert_eq!(normalize_command("echo  'open"), "echo 'open");
    }

    #[test]
    fn tokenize_simple() {
        assert_eq!(tokenize("ls -la /tmp"), vec!["ls", "-la", "/tmp"]);
    }

    #[test]
    fn tokenize_quoted() {
        assert_eq!(tokenize("echo 'hello world'"), vec!["echo", "hello world"]);
    }

    #[test]
    fn tokenize_double_quoted() {
        assert_eq!(tokenize("echo \"hello world\""), vec!["echo", "hello world"]);
    }
}
