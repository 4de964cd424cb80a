//! `#!` directive lines embedded in submitted code.

use thiserror::Error;

const DIRECTIVE_PREFIX: &str = "#!";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("The --from-result and --from-value options cannot be used together.")]
    ConflictingSources,
    #[error("At least one of the options [from-result, from-value] must be specified.")]
    MissingSource,
    #[error("Option '--name' is required.")]
    MissingName,
    #[error("Required argument missing for option: '{0}'.")]
    MissingArgument(String),
    #[error("Unrecognized option '{option}' for directive '#!{directive}'.")]
    UnknownOption { directive: String, option: String },
    #[error("Unrecognized directive '#!{0}'.")]
    UnknownDirective(String),
    #[error("Unterminated quoted argument on line {0}.")]
    UnterminatedQuote(usize),
    #[error("Invalid value reference '{0}'.")]
    InvalidReference(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveNode {
    pub name: String,
    pub args: Vec<String>,
    /// 1-based line number in the submission.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionNode {
    Directive(DirectiveNode),
    /// A run of consecutive non-directive lines.
    Language(String),
}

/// Split a submission into directive lines and the language code between
/// them. Whitespace-only language runs are dropped.
pub fn parse_submission(code: &str) -> Result<Vec<SubmissionNode>, DirectiveError> {
    let mut nodes = Vec::new();
    let mut pending = String::new();
    for (index, line) in code.lines().enumerate() {
        match line.trim_start().strip_prefix(DIRECTIVE_PREFIX) {
            Some(rest) => {
                flush_language(&mut pending, &mut nodes);
                let mut tokens = tokenize(rest, index + 1)?.into_iter();
                let name = tokens.next().unwrap_or_default();
                nodes.push(SubmissionNode::Directive(DirectiveNode {
                    name,
                    args: tokens.collect(),
                    line: index + 1,
                }));
            }
            None => {
                pending.push_str(line);
                pending.push('\n');
            }
        }
    }
    flush_language(&mut pending, &mut nodes);
    Ok(nodes)
}

fn flush_language(pending: &mut String, nodes: &mut Vec<SubmissionNode>) {
    if !pending.trim().is_empty() {
        nodes.push(SubmissionNode::Language(std::mem::take(pending)));
    }
    pending.clear();
}

/// Whitespace-separated tokens; double quotes group, `\"` escapes a quote.
fn tokenize(text: &str, line: usize) -> Result<Vec<String>, DirectiveError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => current.push(escaped),
                            None => return Err(DirectiveError::UnterminatedQuote(line)),
                        },
                        Some(other) => current.push(other),
                        None => return Err(DirectiveError::UnterminatedQuote(line)),
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Code addressed to one kernel by a `#!<kernel>` selector line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSection {
    /// `None` for code that precedes the first selector.
    pub kernel_name: Option<String>,
    pub code: String,
}

/// Split `code` on selector lines naming a kernel for which `is_kernel`
/// returns true. Returns `None` when there are no selectors, so the caller
/// can route the submission unchanged. Sections with no code are dropped.
pub fn split_by_kernel(code: &str, is_kernel: impl Fn(&str) -> bool) -> Option<Vec<KernelSection>> {
    let mut sections = Vec::new();
    let mut current = KernelSection {
        kernel_name: None,
        code: String::new(),
    };
    let mut found = false;
    for line in code.lines() {
        let selector = line
            .trim()
            .strip_prefix(DIRECTIVE_PREFIX)
            .filter(|name| !name.is_empty() && !name.contains(char::is_whitespace))
            .filter(|name| is_kernel(name));
        match selector {
            Some(name) => {
                found = true;
                let next = KernelSection {
                    kernel_name: Some(name.to_string()),
                    code: String::new(),
                };
                sections.push(std::mem::replace(&mut current, next));
            }
            None => {
                current.code.push_str(line);
                current.code.push('\n');
            }
        }
    }
    if !found {
        return None;
    }
    sections.push(current);
    sections.retain(|section| !section.code.trim().is_empty());
    Some(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_and_code_alternate() {
        let nodes = parse_submission("\n#!set --name x --from-result\n1+3").unwrap();
        assert_eq!(
            nodes,
            vec![
                SubmissionNode::Directive(DirectiveNode {
                    name: "set".into(),
                    args: vec!["--name".into(), "x".into(), "--from-result".into()],
                    line: 2,
                }),
                SubmissionNode::Language("1+3\n".into()),
            ]
        );
    }

    #[test]
    fn quoted_arguments_keep_spaces() {
        let nodes = parse_submission(r#"#!set --name x --from-value "hello world""#).unwrap();
        let SubmissionNode::Directive(node) = &nodes[0] else {
            panic!("expected directive");
        };
        assert_eq!(node.args[3], "hello world");
    }

    #[test]
    fn unterminated_quote_is_reported() {
        let err = parse_submission("let a = 1\n#!set --name \"x").unwrap_err();
        assert_eq!(err, DirectiveError::UnterminatedQuote(2));
    }

    #[test]
    fn no_selectors_means_no_split() {
        assert_eq!(split_by_kernel("#!set --name x\n1", |_| true), None);
        assert_eq!(split_by_kernel("1+1", |_| true), None);
    }

    #[test]
    fn selectors_split_code() {
        let code = "let a = 1\n#!fsharp\nlet b = 2\n#!csharp\n\n#!python\nb";
        let sections = split_by_kernel(code, |name| name != "python").unwrap();
        assert_eq!(
            sections,
            vec![
                KernelSection {
                    kernel_name: None,
                    code: "let a = 1\n".into(),
                },
                KernelSection {
                    kernel_name: Some("fsharp".into()),
                    code: "let b = 2\n".into(),
                },
                KernelSection {
                    kernel_name: Some("csharp".into()),
                    code: "\n#!python\nb\n".into(),
                },
            ]
        );
    }
}
