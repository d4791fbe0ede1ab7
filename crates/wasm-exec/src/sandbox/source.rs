//! Program text preparation

/// Remove common leading whitespace from every line of `text`.
///
/// Behaves like Python's `textwrap.dedent`: only spaces and tabs count as
/// indentation, lines containing nothing but spaces and tabs are ignored
/// when computing the margin and are emptied in the output.
pub fn dedent(text: &str) -> String {
    let mut margin: Option<&str> = None;
    for line in text.split('\n') {
        if is_blank(line) {
            continue;
        }
        let indent = leading_indent(line);
        margin = Some(match margin {
            None => indent,
            Some(current) => common_prefix(current, indent),
        });
    }
    let margin = margin.unwrap_or("");

    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if !is_blank(line) {
            out.push_str(&line[margin.len()..]);
        }
    }
    out
}

/// Assemble the program string handed to the guest: the dedented source with
/// the binding prelude (if any) inserted after its leading `__future__`
/// imports, or at the very top when there are none
pub fn program_text(source: &str, prelude: &str) -> String {
    let body = dedent(source);
    if prelude.is_empty() {
        return body;
    }

    let split = future_imports_end(&body);
    let (head, tail) = body.split_at(split);
    let mut program = String::with_capacity(prelude.len() + body.len() + 2);
    program.push_str(head);
    if !head.is_empty() && !head.ends_with('\n') {
        program.push('\n');
    }
    program.push_str(prelude);
    if !prelude.ends_with('\n') {
        program.push('\n');
    }
    program.push_str(tail);
    program
}

/// Byte offset just past the last `from __future__ import` statement at the
/// top of `body`, or 0 if it has none. Only blank lines and comments may
/// precede or separate them.
fn future_imports_end(body: &str) -> usize {
    let mut end = 0;
    let mut offset = 0;
    let mut open_paren = false;
    for line in body.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim();
        if open_paren {
            if trimmed.contains(')') {
                open_paren = false;
                end = offset;
            }
            continue;
        }
        if trimmed.starts_with("from __future__ import") {
            open_paren = trimmed.contains('(') && !trimmed.contains(')');
            if !open_paren {
                end = offset;
            }
        } else if !(trimmed.is_empty() || trimmed.starts_with('#')) {
            break;
        }
    }
    end
}

fn is_blank(line: &str) -> bool {
    line.chars().all(|c| c == ' ' || c == '\t')
}

fn leading_indent(line: &str) -> &str {
    let rest = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - rest.len()]
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    // Indentation is ASCII, so byte positions are char boundaries.
    let len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    &a[..len]
}
