use std::time::{Duration, Instant};

use super::tokenize::tokenize;
use super::types::{Operator, Redirection, Segment};
use crate::error::TokenizeError;

/// How many scanner steps run between wall-clock deadline checks.
const DEADLINE_CHECK_INTERVAL: usize = 256;

/// Splits a command line into simple-command segments.
///
/// Stateless apart from its time budget; build one at startup and share it.
#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    budget: Duration,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl Tokenizer {
    /// Create a tokenizer that gives up after `budget` of wall-clock time.
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    /// Deadline for work starting now. `None` if the budget is too large to
    /// represent, which means no limit.
    pub fn deadline(&self) -> Option<Instant> {
        Instant::now().checked_add(self.budget)
    }

    /// Split `command` at shell control operators (`&&`, `||`, `;`, `|`,
    /// `|&`, newline, background `&`), respecting single/double quotes,
    /// backslash escapes, comments, here-documents and substitutions.
    ///
    /// Substitution spans stay in the segment's `raw` text; their inner
    /// commands are collected in `Segment::substitutions` so the caller can
    /// evaluate them. Comments and here-document bodies are not part of any
    /// segment's `raw`.
    pub fn tokenize(&self, command: &str) -> Result<Vec<Segment>, TokenizeError> {
        self.tokenize_until(command, self.deadline())
    }

    /// [`tokenize`](Self::tokenize) against a deadline shared with other
    /// calls, so nested substitutions all draw on one budget.
    pub fn tokenize_until(
        &self,
        command: &str,
        deadline: Option<Instant>,
    ) -> Result<Vec<Segment>, TokenizeError> {
        let mut clock = Clock::new(deadline, self.budget);
        let chars: Vec<char> = command.chars().collect();
        let len = chars.len();

        let mut segments = Vec::new();
        let mut buf = String::new();
        let mut subs = Vec::new();
        let mut heredocs: Vec<Heredoc> = Vec::new();
        let mut i = 0;
        let (mut sq, mut dq) = (false, false);
        // Whether the next character begins a new shell word
        let mut word_start = true;

        while i < len {
            clock.tick()?;
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if c == '\\' && !sq {
                match next {
                    // Line continuation
                    Some('\n') => i += 2,
                    Some(n) => {
                        buf.push(c);
                        buf.push(n);
                        i += 2;
                        word_start = false;
                    }
                    None => return Err(TokenizeError::TrailingEscape),
                }
                continue;
            }
            if c == '\'' && !dq {
                sq = !sq;
                buf.push(c);
                i += 1;
                word_start = false;
                continue;
            }
            if c == '"' && !sq {
                dq = !dq;
                buf.push(c);
                i += 1;
                word_start = false;
                continue;
            }
            // Single quotes block all substitution
            if sq {
                buf.push(c);
                i += 1;
                continue;
            }

            // $( is expanded inside double quotes too
            if c == '$' && next == Some('(') {
                let (inner, end) = capture_parens(&chars, i + 2, "$(", &mut clock)?;
                buf.extend(&chars[i..end]);
                push_substitution(&mut subs, &inner);
                i = end;
                word_start = false;
                continue;
            }
            if c == '`' {
                let (inner, end) = capture_backtick(&chars, i + 1, &mut clock)?;
                buf.extend(&chars[i..end]);
                push_substitution(&mut subs, &inner);
                i = end;
                word_start = false;
                continue;
            }
            if dq {
                buf.push(c);
                i += 1;
                continue;
            }

            // A comment runs to the end of the line; the newline still
            // separates commands.
            if c == '#' && word_start {
                i = line_end(&chars, i);
                continue;
            }

            // Process substitution <() / >()
            if (c == '<' || c == '>') && next == Some('(') {
                let opener = if c == '<' { "<(" } else { ">(" };
                let (inner, end) = capture_parens(&chars, i + 2, opener, &mut clock)?;
                buf.extend(&chars[i..end]);
                push_substitution(&mut subs, &inner);
                i = end;
                word_start = false;
                continue;
            }

            // Here-document; its body starts after the next unquoted newline
            if c == '<' && next == Some('<') && chars.get(i + 2) != Some(&'<') {
                let (doc, end) = read_heredoc_operator(&chars, i)?;
                buf.extend(&chars[i..end]);
                heredocs.push(doc);
                i = end;
                word_start = false;
                continue;
            }
            if c == '\n' && !heredocs.is_empty() {
                let mut pos = i + 1;
                for doc in heredocs.drain(..) {
                    let (body_end, after) = find_heredoc_end(&chars, pos, &doc)?;
                    if !doc.quoted {
                        body_substitutions(&chars[pos..body_end], &mut subs, &mut clock)?;
                    }
                    pos = after;
                }
                clock.check()?;
                finish_segment(&mut segments, &mut buf, &mut subs, Some(Operator::Sequence));
                i = pos;
                word_start = true;
                continue;
            }

            let op = match (c, next) {
                ('&', Some('&')) => Some((Operator::And, 2)),
                ('|', Some('|')) => Some((Operator::Or, 2)),
                ('|', Some('&')) => Some((Operator::Pipe, 2)),
                ('|', _) => Some((Operator::Pipe, 1)),
                (';', _) | ('\n', _) => Some((Operator::Sequence, 1)),
                // Background job; `&>`, `>&2` and `2>&1` are redirections
                ('&', n) if n != Some('>') && !matches!(buf.chars().last(), Some('>' | '<')) => {
                    Some((Operator::Sequence, 1))
                }
                _ => None,
            };
            if let Some((op, width)) = op {
                finish_segment(&mut segments, &mut buf, &mut subs, Some(op));
                i += width;
                word_start = true;
                continue;
            }

            buf.push(c);
            word_start = breaks_word(c);
            i += 1;
        }

        if sq {
            return Err(TokenizeError::UnterminatedSingleQuote);
        }
        if dq {
            return Err(TokenizeError::UnterminatedDoubleQuote);
        }
        if let Some(doc) = heredocs.first() {
            return Err(TokenizeError::UnterminatedHeredoc {
                delimiter: doc.delimiter.clone(),
            });
        }
        finish_segment(&mut segments, &mut buf, &mut subs, None);
        if let Some(last) = segments.last_mut() {
            last.following_operator = None;
        }
        Ok(segments)
    }
}

/// Wall-clock deadline for one evaluation, checked every few scanner steps.
struct Clock {
    deadline: Option<Instant>,
    budget: Duration,
    steps: usize,
}

impl Clock {
    fn new(deadline: Option<Instant>, budget: Duration) -> Self {
        Self {
            deadline,
            budget,
            steps: 0,
        }
    }

    fn tick(&mut self) -> Result<(), TokenizeError> {
        let due = self.steps % DEADLINE_CHECK_INTERVAL == 0;
        self.steps += 1;
        if due { self.check() } else { Ok(()) }
    }

    fn check(&self) -> Result<(), TokenizeError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(TokenizeError::BudgetExceeded {
                budget_ms: self.budget.as_millis(),
            }),
            _ => Ok(()),
        }
    }
}

/// Whether an unquoted `c` ends a word, so that a following `#` starts a
/// comment.
fn breaks_word(c: char) -> bool {
    c.is_whitespace() || matches!(c, ';' | '&' | '|' | '<' | '>' | '(' | ')')
}

/// Index of the newline ending the line that contains `i`, or `chars.len()`.
fn line_end(chars: &[char], i: usize) -> usize {
    chars[i..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(chars.len(), |p| i + p)
}

fn push_substitution(subs: &mut Vec<String>, inner: &str) {
    let trimmed = inner.trim();
    if !trimmed.is_empty() {
        subs.push(trimmed.to_string());
    }
}

fn finish_segment(
    segments: &mut Vec<Segment>,
    buf: &mut String,
    subs: &mut Vec<String>,
    op: Option<Operator>,
) {
    let raw = buf.trim().to_string();
    buf.clear();
    if raw.is_empty() {
        // Here-document substitutions read after a trailing operator belong
        // to the command that opened the here-document.
        match segments.last_mut() {
            Some(last) => last.substitutions.append(subs),
            None => subs.clear(),
        }
        return;
    }
    let redirection = has_output_redirection(&raw);
    segments.push(Segment {
        tokens: tokenize(&raw),
        raw,
        following_operator: op,
        substitutions: std::mem::take(subs),
        redirection,
    });
}

/// A here-document whose body has not been read yet.
#[derive(Debug)]
struct Heredoc {
    delimiter: String,
    /// `<<-`: leading tabs are ignored on the terminator line.
    strip_tabs: bool,
    /// A quoted delimiter turns off expansion in the body.
    quoted: bool,
}

/// Parse `<<WORD` / `<<-WORD` at `start`. Returns the pending document and
/// the index after the delimiter word.
fn read_heredoc_operator(chars: &[char], start: usize) -> Result<(Heredoc, usize), TokenizeError> {
    let mut i = start + 2;
    let strip_tabs = chars.get(i) == Some(&'-');
    if strip_tabs {
        i += 1;
    }
    while i < chars.len() && matches!(chars[i], ' ' | '\t') {
        i += 1;
    }

    let mut delimiter = String::new();
    let mut quoted = false;
    let (mut sq, mut dq) = (false, false);
    while i < chars.len() {
        let c = chars[i];
        if sq || dq {
            if (sq && c == '\'') || (dq && c == '"') {
                sq = false;
                dq = false;
            } else {
                delimiter.push(c);
            }
            i += 1;
            continue;
        }
        match c {
            '\'' => {
                sq = true;
                quoted = true;
            }
            '"' => {
                dq = true;
                quoted = true;
            }
            '\\' => match chars.get(i + 1) {
                Some(&n) => {
                    delimiter.push(n);
                    quoted = true;
                    i += 1;
                }
                None => return Err(TokenizeError::TrailingEscape),
            },
            c if breaks_word(c) => break,
            c => delimiter.push(c),
        }
        i += 1;
    }

    if sq {
        return Err(TokenizeError::UnterminatedSingleQuote);
    }
    if dq {
        return Err(TokenizeError::UnterminatedDoubleQuote);
    }
    if delimiter.is_empty() && !quoted {
        return Err(TokenizeError::MissingHeredocDelimiter);
    }
    Ok((
        Heredoc {
            delimiter,
            strip_tabs,
            quoted,
        },
        i,
    ))
}

/// Find the terminator line of `doc`, whose body starts at `start`.
/// Returns the index where the terminator line begins and the index after it.
fn find_heredoc_end(chars: &[char], start: usize, doc: &Heredoc) -> Result<(usize, usize), TokenizeError> {
    let mut line_start = start;
    while line_start < chars.len() {
        let end = line_end(chars, line_start);
        let line: String = chars[line_start..end].iter().collect();
        let line = if doc.strip_tabs {
            line.trim_start_matches('\t')
        } else {
            line.as_str()
        };
        if line == doc.delimiter {
            return Ok((line_start, (end + 1).min(chars.len())));
        }
        line_start = end + 1;
    }
    Err(TokenizeError::UnterminatedHeredoc {
        delimiter: doc.delimiter.clone(),
    })
}

/// Collect `$(...)` and backtick substitutions from an unquoted
/// here-document body. Quotes are literal there but substitutions still run.
fn body_substitutions(body: &[char], subs: &mut Vec<String>, clock: &mut Clock) -> Result<(), TokenizeError> {
    let mut i = 0;
    while i < body.len() {
        clock.tick()?;
        match (body[i], body.get(i + 1).copied()) {
            ('\\', Some(_)) => i += 2,
            ('$', Some('(')) => {
                let (inner, end) = capture_parens(body, i + 2, "$(", clock)?;
                push_substitution(subs, &inner);
                i = end;
            }
            ('`', _) => {
                let (inner, end) = capture_backtick(body, i + 1, clock)?;
                push_substitution(subs, &inner);
                i = end;
            }
            _ => i += 1,
        }
    }
    Ok(())
}

/// Extract the balanced content of a `$(`, `<(` or `>(` opened just before
/// `start`. Returns the inner text and the index after the closing `)`.
///
/// Comments and here-document bodies inside are copied through untouched so
/// their quotes and parentheses cannot end the capture early.
fn capture_parens(
    chars: &[char],
    start: usize,
    opener: &'static str,
    clock: &mut Clock,
) -> Result<(String, usize), TokenizeError> {
    let len = chars.len();
    let mut depth: u32 = 1;
    let mut inner = String::new();
    let (mut isq, mut idq) = (false, false);
    let mut word_start = true;
    let mut heredocs: Vec<Heredoc> = Vec::new();
    let mut i = start;
    while i < len {
        clock.tick()?;
        let ic = chars[i];
        if ic == '\\' && !isq {
            inner.extend(chars[i..].iter().take(2));
            i += 2;
            word_start = false;
            continue;
        }
        if ic == '\'' && !idq {
            isq = !isq;
        } else if ic == '"' && !isq {
            idq = !idq;
        } else if !isq && !idq {
            match ic {
                '#' if word_start => {
                    let end = line_end(chars, i);
                    inner.extend(&chars[i..end]);
                    i = end;
                    continue;
                }
                '<' if chars.get(i + 1) == Some(&'<') && chars.get(i + 2) != Some(&'<') => {
                    let (doc, end) = read_heredoc_operator(chars, i)?;
                    inner.extend(&chars[i..end]);
                    heredocs.push(doc);
                    i = end;
                    word_start = false;
                    continue;
                }
                '\n' if !heredocs.is_empty() => {
                    let mut pos = i + 1;
                    for doc in heredocs.drain(..) {
                        pos = find_heredoc_end(chars, pos, &doc)?.1;
                    }
                    inner.extend(&chars[i..pos]);
                    i = pos;
                    word_start = true;
                    continue;
                }
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok((inner, i + 1));
                    }
                }
                _ => {}
            }
        }
        inner.push(ic);
        word_start = !isq && !idq && breaks_word(ic);
        i += 1;
    }
    Err(TokenizeError::UnterminatedSubstitution { opener })
}

/// Extract the content of a backtick substitution opened just before `start`.
fn capture_backtick(
    chars: &[char],
    start: usize,
    clock: &mut Clock,
) -> Result<(String, usize), TokenizeError> {
    let len = chars.len();
    let mut inner = String::new();
    let mut i = start;
    while i < len {
        clock.tick()?;
        if chars[i] == '\\' && i + 1 < len {
            inner.push(chars[i]);
            inner.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if chars[i] == '`' {
            return Ok((inner, i + 1));
        }
        inner.push(chars[i]);
        i += 1;
    }
    Err(TokenizeError::UnterminatedBacktick)
}

/// Whether the redirection target starting at `i` is `/dev/null`.
fn targets_dev_null(chars: &[char], mut i: usize) -> bool {
    while i < chars.len() && (chars[i] == '>' || chars[i] == '|' || chars[i].is_whitespace()) {
        i += 1;
    }
    let target: String = chars[i..]
        .iter()
        .take_while(|c| !c.is_whitespace() && !matches!(c, ';' | '&' | '|'))
        .collect();
    target == "/dev/null"
}

/// Detect output redirection (>, >>, &>, fd>) outside quotes.
/// Does NOT flag:
///   - Input redirection (<) or here-docs (<<, <<<)
///   - fd-to-fd duplication: >&N, N>&M, >&-, N>&- (e.g. 2>&1)
///   - Redirection to /dev/null
pub fn has_output_redirection(command: &str) -> Option<Redirection> {
    let chars: Vec<char> = command.chars().collect();
    let len = chars.len();
    let mut i = 0;
    let (mut sq, mut dq, mut esc) = (false, false, false);

    while i < len {
        let c = chars[i];

        if esc {
            esc = false;
            i += 1;
            continue;
        }
        if c == '\\' && !sq {
            esc = true;
            i += 1;
            continue;
        }
        if c == '\'' && !dq {
            sq = !sq;
            i += 1;
            continue;
        }
        if c == '"' && !sq {
            dq = !dq;
            i += 1;
            continue;
        }
        if sq || dq {
            i += 1;
            continue;
        }

        // &> or &>> (redirect both stdout+stderr to file)
        if c == '&' && i + 1 < len && chars[i + 1] == '>' {
            if targets_dev_null(&chars, i + 1) {
                i += 2;
                continue;
            }
            return Some(Redirection {
                description: "output redirection (&>)".into(),
            });
        }

        // fd redirects: N>, N>>, N>&M, N>&-
        if c.is_ascii_digit() && i + 1 < len && chars[i + 1] == '>' {
            // N>&M or N>&- is fd duplication/closing, not file output
            if i + 3 < len
                && chars[i + 2] == '&'
                && (chars[i + 3].is_ascii_digit() || chars[i + 3] == '-')
            {
                i += 4;
                continue;
            }
            if targets_dev_null(&chars, i + 1) {
                i += 2;
                continue;
            }
            return Some(Redirection {
                description: format!("output redirection ({c}>)"),
            });
        }

        // > or >> but NOT >( (process substitution), >&N, or >&-
        if c == '>' {
            if i + 1 < len && chars[i + 1] == '(' {
                i += 1;
                continue;
            }
            if i + 2 < len
                && chars[i + 1] == '&'
                && (chars[i + 2].is_ascii_digit() || chars[i + 2] == '-')
            {
                i += 3;
                continue;
            }
            if targets_dev_null(&chars, i) {
                i += 1;
                continue;
            }
            let op = if i + 1 < len && chars[i + 1] == '>' { ">>" } else { ">" };
            return Some(Redirection {
                description: format!("output redirection ({op})"),
            });
        }

        i += 1;
    }

    None
}
