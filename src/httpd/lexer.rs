//! httpd configuration syntax.
//!
//! Produces a tree of directives and `<Section>` blocks. Handles backslash line
//! continuation, whole-line `#` comments and quoted arguments.

use super::ImportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub args: Vec<String>,
    /// 1-based line the directive starts on
    pub line: usize,
}

impl Directive {
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub args: Vec<String>,
    pub line: usize,
    pub children: Vec<Node>,
}

impl Section {
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Directive(Directive),
    Section(Section),
}

/// Parse a whole configuration file.
pub fn parse(contents: &str) -> Result<Vec<Node>, ImportError> {
    let mut root = Vec::new();
    let mut stack: Vec<Section> = Vec::new();

    for (line, text) in logical_lines(contents) {
        let text = text.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        if let Some(close) = text.strip_prefix("</") {
            let name = close
                .strip_suffix('>')
                .ok_or_else(|| syntax(line, "section close is missing '>'"))?
                .trim();
            let section = stack
                .pop()
                .ok_or_else(|| syntax(line, &format!("</{}> without matching open section", name)))?;
            if !section.is(name) {
                return Err(syntax(
                    line,
                    &format!(
                        "</{}> closes <{}> opened on line {}",
                        name, section.name, section.line
                    ),
                ));
            }
            push(&mut stack, &mut root, Node::Section(section));
            continue;
        }

        if let Some(open) = text.strip_prefix('<') {
            let inner = open
                .strip_suffix('>')
                .ok_or_else(|| syntax(line, "section open is missing '>'"))?;
            let mut words = split_args(inner, line)?.into_iter();
            let name = words
                .next()
                .ok_or_else(|| syntax(line, "section without a name"))?;
            stack.push(Section {
                name,
                args: words.collect(),
                line,
                children: Vec::new(),
            });
            continue;
        }

        let mut words = split_args(text, line)?.into_iter();
        if let Some(name) = words.next() {
            push(
                &mut stack,
                &mut root,
                Node::Directive(Directive {
                    name,
                    args: words.collect(),
                    line,
                }),
            );
        }
    }

    if let Some(open) = stack.pop() {
        return Err(syntax(
            open.line,
            &format!("<{}> is never closed", open.name),
        ));
    }

    Ok(root)
}

fn push(stack: &mut [Section], root: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => root.push(node),
    }
}

fn syntax(line: usize, message: &str) -> ImportError {
    ImportError::Syntax {
        line,
        message: message.to_string(),
    }
}

/// Join backslash-continued lines; yields (first line number, text).
fn logical_lines(contents: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (index, raw) in contents.lines().enumerate() {
        let number = index + 1;
        let (text, continued) = match raw.trim_end().strip_suffix('\\') {
            Some(head) => (head, true),
            None => (raw, false),
        };

        let (start, mut buffer) = pending.take().unwrap_or((number, String::new()));
        if !buffer.is_empty() {
            buffer.push(' ');
        }
        buffer.push_str(text.trim());

        if continued {
            pending = Some((start, buffer));
        } else {
            lines.push((start, buffer));
        }
    }

    if let Some(last) = pending {
        lines.push(last);
    }
    lines
}

/// Split a line into arguments. Quotes group words; inside quotes a backslash
/// only escapes the quote character.
fn split_args(text: &str, line: usize) -> Result<Vec<String>, ImportError> {
    let mut args = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut word = String::new();
        if c == '"' || c == '\'' {
            let quote = c;
            chars.next();
            let mut closed = false;
            while let Some(ch) = chars.next() {
                if ch == '\\' && chars.peek() == Some(&quote) {
                    word.push(quote);
                    chars.next();
                } else if ch == quote {
                    closed = true;
                    break;
                } else {
                    word.push(ch);
                }
            }
            if !closed {
                return Err(syntax(line, "unterminated quoted argument"));
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                word.push(ch);
                chars.next();
            }
        }
        args.push(word);
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive(node: &Node) -> &Directive {
        match node {
            Node::Directive(d) => d,
            Node::Section(s) => panic!("expected directive, got section {}", s.name),
        }
    }

    #[test]
    fn test_directives_and_sections() {
        let nodes = parse(
            "Listen 443\n\
             <VirtualHost *:80>\n\
             \tRewriteEngine On\n\
             </VirtualHost>\n",
        )
        .unwrap();

        assert_eq!(nodes.len(), 2);
        let listen = directive(&nodes[0]);
        assert!(listen.is("listen"));
        assert_eq!(listen.args, vec!["443"]);

        match &nodes[1] {
            Node::Section(section) => {
                assert!(section.is("virtualhost"));
                assert_eq!(section.args, vec!["*:80"]);
                assert_eq!(section.line, 2);
                assert_eq!(directive(&section.children[0]).line, 3);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_quotes_and_escapes() {
        let nodes = parse(r#"Header always set X-Test "a \"quoted\" value" 'single'"#).unwrap();
        let header = directive(&nodes[0]);
        assert_eq!(
            header.args,
            vec!["always", "set", "X-Test", "a \"quoted\" value", "single"]
        );
    }

    #[test]
    fn test_regex_backslashes_are_literal() {
        let nodes = parse(r"RewriteRule ^/a\.html$ /b.html [R]").unwrap();
        assert_eq!(directive(&nodes[0]).args[0], r"^/a\.html$");
    }

    #[test]
    fn test_line_continuation_and_comments() {
        let nodes = parse(
            "# comment\n\
             SSLCipherSuite A:\\\n\
             \x20\x20B\n\
             \n\
             SSLProtocol all\n",
        )
        .unwrap();
        let ciphers = directive(&nodes[0]);
        assert_eq!(ciphers.line, 2);
        assert_eq!(ciphers.args, vec!["A:", "B"]);
        assert_eq!(directive(&nodes[1]).line, 5);
    }

    #[test]
    fn test_unterminated_quote() {
        let err = parse("SSLStaplingCache \"shmcb:logs/x(1)").unwrap_err();
        assert!(matches!(err, ImportError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_section_errors() {
        assert!(matches!(
            parse("</VirtualHost>").unwrap_err(),
            ImportError::Syntax { line: 1, .. }
        ));
        assert!(matches!(
            parse("<VirtualHost *:80>\n</IfModule>").unwrap_err(),
            ImportError::Syntax { line: 2, .. }
        ));
        assert!(matches!(
            parse("\n<VirtualHost *:80>\nListen 1\n").unwrap_err(),
            ImportError::Syntax { line: 2, .. }
        ));
    }
}
