//! Structured summary documents and their rendering to host markup.

/// Inline content of a paragraph or list item.
#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String),
    Bold(String),
    Link { text: String, url: String },
    Image { alt: String, url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, content: Vec<Inline> },
    Paragraph(Vec<Inline>),
    BulletList(Vec<Vec<Inline>>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }
}

/// Renders a [`Document`] into the markup a host understands.
pub trait Formatter: Send + Sync {
    fn format(&self, document: &Document) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownFormatter;

impl MarkdownFormatter {
    fn inline(out: &mut String, content: &[Inline]) {
        for node in content {
            match node {
                Inline::Text(text) => out.push_str(text),
                Inline::Bold(text) => {
                    out.push_str("**");
                    out.push_str(text);
                    out.push_str("**");
                }
                Inline::Link { text, url } => out.push_str(&format!("[{text}]({url})")),
                Inline::Image { alt, url } => out.push_str(&format!("![{alt}]({url})")),
            }
        }
    }
}

impl Formatter for MarkdownFormatter {
    fn format(&self, document: &Document) -> String {
        let mut out = String::new();
        for block in &document.blocks {
            if !out.is_empty() {
                out.push('\n');
            }
            match block {
                Block::Heading { level, content } => {
                    out.push_str(&"#".repeat((*level).clamp(1, 6) as usize));
                    out.push(' ');
                    Self::inline(&mut out, content);
                    out.push('\n');
                }
                Block::Paragraph(content) => {
                    Self::inline(&mut out, content);
                    out.push('\n');
                }
                Block::BulletList(items) => {
                    for item in items {
                        out.push_str("- ");
                        Self::inline(&mut out, item);
                        out.push('\n');
                    }
                }
            }
        }
        out
    }
}

/// Marker line carried by every summary comment of a project.
pub fn summary_marker(project_key: &str) -> String {
    format!("**Project ID:** {project_key}")
}

/// Marker line carried by every per-issue comment of a project.
pub fn issue_marker(project_key: &str, issue_key: &str) -> String {
    format!("**Project ID:** {project_key} | **Issue Key:** {issue_key}")
}

pub fn is_summary_of(body: &str, project_key: &str) -> bool {
    let marker = summary_marker(project_key);
    body.lines().any(|line| line.trim() == marker)
}

/// Issue key named by a per-issue comment of `project_key`.
pub fn issue_key_of<'b>(body: &'b str, project_key: &str) -> Option<&'b str> {
    let prefix = format!("**Project ID:** {project_key} | **Issue Key:** ");
    body.lines()
        .find_map(|line| line.trim().strip_prefix(prefix.as_str()))
        .map(str::trim)
}

pub fn is_issue_comment_of(body: &str, project_key: &str) -> bool {
    issue_key_of(body, project_key).is_some()
}
