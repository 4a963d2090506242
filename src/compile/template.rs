//! Template syntax parser
//!
//! Turns template source text into frontmatter directives and a renderer
//! program. Errors carry the 1-based source line they were found on.

use crate::compile::artifact::{Diagnostic, Directive, Node, Prop, PropValue, SlotFill};
use crate::error::{TrellisError, TrellisResult};
use std::collections::BTreeSet;

/// Name used for slot content not wrapped in a `fill` block
pub const DEFAULT_SLOT: &str = "default";

/// Output of parsing one template
#[derive(Debug, Default)]
pub struct ParsedTemplate {
    pub frontmatter: Vec<Directive>,
    pub program: Vec<Node>,
    pub css_deps: BTreeSet<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a template source file
pub fn parse_template(
    filename: &str,
    source: &str,
    compress_html: bool,
) -> TrellisResult<ParsedTemplate> {
    let mut parsed = ParsedTemplate::default();

    let (front, body, body_line) = split_frontmatter(filename, source)?;
    if let Some(front) = front {
        parse_frontmatter(filename, front, &mut parsed)?;
    }

    let tokens = tokenize(body, body_line).map_err(|e| TrellisError::compile(filename, e))?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        compress_html,
    };

    // Top level has no terminators, so stray end tags surface as errors.
    let (program, _) = parser
        .parse_until(&[])
        .map_err(|e| TrellisError::compile(filename, e))?;

    parsed.program = program;
    Ok(parsed)
}

/// Split off a `---` fenced frontmatter block.
///
/// Returns the frontmatter text, the body, and the number of source lines
/// that precede the body.
fn split_frontmatter<'a>(
    filename: &str,
    source: &'a str,
) -> TrellisResult<(Option<&'a str>, &'a str, usize)> {
    let mut lines = source.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok((None, source, 0));
    };
    if first.trim_end() != "---" {
        return Ok((None, source, 0));
    }

    let start = first.len();
    let mut pos = start;
    let mut consumed = 1;
    for line in lines {
        consumed += 1;
        if line.trim_end() == "---" {
            return Ok((Some(&source[start..pos]), &source[pos + line.len()..], consumed));
        }
        pos += line.len();
    }

    Err(TrellisError::compile(
        filename,
        "line 1: frontmatter fence is never closed",
    ))
}

fn parse_frontmatter(filename: &str, front: &str, parsed: &mut ParsedTemplate) -> TrellisResult<()> {
    for (index, raw) in front.lines().enumerate() {
        let line = index + 2;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let (word, rest) = match text.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (text, ""),
        };
        let fail = |msg: &str| TrellisError::compile(filename, format!("line {}: {}", line, msg));

        let directive = match word {
            "reroute" if !rest.is_empty() => Directive::Reroute {
                path: rest.to_string(),
            },
            "reroute" => return Err(fail("reroute needs a target path")),
            "status" => match rest.parse::<u16>() {
                Ok(code) if (100..=599).contains(&code) => Directive::Status { code },
                _ => return Err(fail("status must be a number between 100 and 599")),
            },
            "set" if !rest.is_empty() => {
                let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                Directive::Set {
                    key: key.to_string(),
                    value: value.trim().to_string(),
                }
            }
            "set" => return Err(fail("set needs a key")),
            "header" => match rest.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => Directive::Header {
                    name: name.trim().to_string(),
                    value: value.trim().to_string(),
                },
                _ => return Err(fail("header must look like `header Name: value`")),
            },
            "cookie" if !rest.is_empty() => Directive::Cookie {
                value: rest.to_string(),
            },
            "cookie" => return Err(fail("cookie needs a value")),
            "css" if !rest.is_empty() => {
                parsed.css_deps.insert(rest.to_string());
                continue;
            }
            "css" => return Err(fail("css needs a stylesheet path")),
            "upgrade" if rest == "websocket" => Directive::Upgrade,
            "upgrade" => return Err(fail("only `upgrade websocket` is supported")),
            other => {
                parsed.diagnostics.push(Diagnostic::warning(
                    line,
                    format!("unknown directive `{}` ignored", other),
                ));
                continue;
            }
        };
        parsed.frontmatter.push(directive);
    }
    Ok(())
}

#[derive(Debug)]
enum Token<'a> {
    Text(&'a str),
    Expr { path: String, raw: bool },
    Tag(Tag),
}

#[derive(Debug, Clone)]
struct Tag {
    name: String,
    args: Vec<String>,
    line: usize,
}

fn tokenize(body: &str, line_offset: usize) -> Result<Vec<Token<'_>>, String> {
    let mut tokens = Vec::new();
    let mut rest = body;
    let mut line = line_offset + 1;

    loop {
        let next = ["{{", "{%", "{#"]
            .iter()
            .filter_map(|open| rest.find(open))
            .min();
        let Some(at) = next else {
            if !rest.is_empty() {
                tokens.push(Token::Text(rest));
            }
            break;
        };

        if at > 0 {
            tokens.push(Token::Text(&rest[..at]));
            line += rest[..at].matches('\n').count();
        }

        let tail = &rest[at..];
        let (open, close) = if tail.starts_with("{{{") {
            ("{{{", "}}}")
        } else if tail.starts_with("{{") {
            ("{{", "}}")
        } else if tail.starts_with("{%") {
            ("{%", "%}")
        } else {
            ("{#", "#}")
        };

        let inner_start = open.len();
        let Some(len) = tail[inner_start..].find(close) else {
            return Err(format!("line {}: `{}` is never closed", line, open));
        };
        let inner = &tail[inner_start..inner_start + len];

        match open {
            "{{{" | "{{" => {
                let path = inner.trim();
                if !is_valid_path(path) {
                    return Err(format!("line {}: invalid expression `{}`", line, path));
                }
                tokens.push(Token::Expr {
                    path: path.to_string(),
                    raw: open == "{{{",
                });
            }
            "{%" => {
                let mut words = split_words(inner.trim()).map_err(|e| format!("line {}: {}", line, e))?;
                if words.is_empty() {
                    return Err(format!("line {}: empty tag", line));
                }
                let name = words.remove(0);
                tokens.push(Token::Tag(Tag {
                    name,
                    args: words,
                    line,
                }));
            }
            _ => {}
        }

        line += inner.matches('\n').count();
        rest = &tail[inner_start + len + close.len()..];
    }

    Ok(tokens)
}

/// Split tag arguments on whitespace, keeping double-quoted runs together
fn split_words(s: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in s.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if quoted {
        return Err("unterminated string".to_string());
    }
    if !current.is_empty() {
        words.push(current);
    }
    Ok(words)
}

fn unquote(s: &str) -> Option<&str> {
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"'))
}

fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Name argument that may be bare or quoted
fn name_arg(arg: &str) -> &str {
    unquote(arg).unwrap_or(arg)
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    compress_html: bool,
}

impl Parser<'_> {
    /// Parse nodes until one of `ends` (returned) or end of input (`None`)
    fn parse_until(&mut self, ends: &[&str]) -> Result<(Vec<Node>, Option<Tag>), String> {
        let mut nodes = Vec::new();

        while self.pos < self.tokens.len() {
            let index = self.pos;
            self.pos += 1;

            let tag = match &self.tokens[index] {
                Token::Text(text) => {
                    let value = if self.compress_html {
                        collapse_whitespace(text)
                    } else {
                        text.to_string()
                    };
                    if !value.is_empty() {
                        nodes.push(Node::Html { value });
                    }
                    continue;
                }
                Token::Expr { path, raw } => {
                    nodes.push(Node::Expr {
                        path: path.clone(),
                        raw: *raw,
                    });
                    continue;
                }
                Token::Tag(tag) => tag.clone(),
            };

            if ends.contains(&tag.name.as_str()) {
                return Ok((nodes, Some(tag)));
            }

            let node = match tag.name.as_str() {
                "slot" => self.parse_slot(&tag)?,
                "component" => self.parse_component(&tag, "endcomponent", None)?,
                "island" => {
                    let client = tag
                        .args
                        .iter()
                        .find_map(|a| a.strip_prefix("client="))
                        .map(|v| name_arg(v).to_string())
                        .ok_or_else(|| format!("line {}: island needs client=\"...\"", tag.line))?;
                    self.parse_component(&tag, "endisland", Some(client))?
                }
                "head" => Node::Head,
                "if" => self.parse_if(&tag)?,
                other => return Err(format!("line {}: unexpected {{% {} %}}", tag.line, other)),
            };
            nodes.push(node);
        }

        Ok((nodes, None))
    }

    fn expect_end(&mut self, end: &str, opened: &Tag) -> Result<Vec<Node>, String> {
        match self.parse_until(&[end])? {
            (nodes, Some(_)) => Ok(nodes),
            (_, None) => Err(format!(
                "line {}: {{% {} %}} is missing {{% {} %}}",
                opened.line, opened.name, end
            )),
        }
    }

    fn parse_slot(&mut self, tag: &Tag) -> Result<Node, String> {
        let (args, has_fallback) = match tag.args.split_last() {
            Some((last, rest)) if last == "else" => (rest, true),
            _ => (tag.args.as_slice(), false),
        };
        let name = match args {
            [] => DEFAULT_SLOT.to_string(),
            [name] => name_arg(name).to_string(),
            _ => return Err(format!("line {}: slot takes at most one name", tag.line)),
        };
        let fallback = if has_fallback {
            self.expect_end("endslot", tag)?
        } else {
            Vec::new()
        };
        Ok(Node::Slot { name, fallback })
    }

    fn parse_component(
        &mut self,
        tag: &Tag,
        end: &str,
        client: Option<String>,
    ) -> Result<Node, String> {
        let src = tag
            .args
            .first()
            .and_then(|a| unquote(a))
            .ok_or_else(|| format!("line {}: {} needs a quoted file name", tag.line, tag.name))?
            .to_string();

        let mut props = Vec::new();
        for arg in &tag.args[1..] {
            let (name, value) = arg
                .split_once('=')
                .ok_or_else(|| format!("line {}: expected name=value, got `{}`", tag.line, arg))?;
            if name == "client" && client.is_some() {
                continue;
            }
            let value = match unquote(value) {
                Some(literal) => PropValue::Literal(literal.to_string()),
                None if is_valid_path(value) => PropValue::Path(value.to_string()),
                None => return Err(format!("line {}: invalid value for `{}`", tag.line, name)),
            };
            props.push(Prop {
                name: name.to_string(),
                value,
            });
        }

        let mut default_body = Vec::new();
        let mut slots: Vec<SlotFill> = Vec::new();
        loop {
            let (nodes, terminator) = self.parse_until(&[end, "fill"])?;
            default_body.extend(nodes);
            match terminator {
                Some(t) if t.name == "fill" => {
                    let name = match t.args.as_slice() {
                        [name] => name_arg(name).to_string(),
                        _ => return Err(format!("line {}: fill needs exactly one name", t.line)),
                    };
                    let body = self.expect_end("endfill", &t)?;
                    slots.push(SlotFill { name, body });
                }
                Some(_) => break,
                None => {
                    return Err(format!(
                        "line {}: {{% {} %}} is missing {{% {} %}}",
                        tag.line, tag.name, end
                    ))
                }
            }
        }

        let has_default_content = default_body.iter().any(|n| match n {
            Node::Html { value } => !value.trim().is_empty(),
            _ => true,
        });
        if has_default_content && !slots.iter().any(|s| s.name == DEFAULT_SLOT) {
            slots.push(SlotFill {
                name: DEFAULT_SLOT.to_string(),
                body: default_body,
            });
        }

        Ok(Node::Component {
            src,
            props,
            slots,
            client,
        })
    }

    fn parse_if(&mut self, tag: &Tag) -> Result<Node, String> {
        let path = match tag.args.as_slice() {
            [path] if is_valid_path(path) => path.clone(),
            _ => return Err(format!("line {}: if needs one value path", tag.line)),
        };
        let (then, terminator) = self.parse_until(&["else", "endif"])?;
        let otherwise = match terminator {
            Some(t) if t.name == "else" => self.expect_end("endif", tag)?,
            Some(_) => Vec::new(),
            None => return Err(format!("line {}: {{% if %}} is missing {{% endif %}}", tag.line)),
        };
        Ok(Node::If {
            path,
            then,
            otherwise,
        })
    }
}
