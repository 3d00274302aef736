//! Minimal DOT document writer.

use std::fmt::Write;

/// Escape a string for use inside a double-quoted DOT string.
pub fn escape(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Turn an arbitrary name into a bare DOT identifier fragment.
pub fn sanitize_id(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn write_attrs(output: &mut String, attrs: &[(&str, &str)]) {
    output.push('[');
    for (i, (key, value)) in attrs.iter().enumerate() {
        if i > 0 {
            output.push_str(", ");
        }
        // HTML-like labels are passed through untouched
        if value.starts_with('<') && value.ends_with('>') {
            let _ = write!(output, "{key}={value}");
        } else {
            let _ = write!(output, "{}=\"{}\"", key, escape(value));
        }
    }
    output.push(']');
}

/// Builds a `digraph` document. Node identifiers are always quoted.
pub struct DotBuilder {
    output: String,
    indent: usize,
}

impl DotBuilder {
    pub fn new(name: &str) -> Self {
        let mut output = String::with_capacity(4096);
        let _ = writeln!(output, "digraph {} {{", sanitize_id(name));
        Self { output, indent: 1 }
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.output.push_str("  ");
        }
    }

    /// Add a graph attribute.
    pub fn attr(&mut self, key: &str, value: &str) -> &mut Self {
        self.write_indent();
        let _ = writeln!(self.output, "{}=\"{}\";", key, escape(value));
        self
    }

    /// Set default attributes for all nodes.
    pub fn node_defaults(&mut self, attrs: &[(&str, &str)]) -> &mut Self {
        self.write_indent();
        self.output.push_str("node ");
        write_attrs(&mut self.output, attrs);
        self.output.push_str(";\n");
        self
    }

    pub fn node(&mut self, id: &str, attrs: &[(&str, &str)]) -> &mut Self {
        self.write_indent();
        let _ = write!(self.output, "\"{}\"", escape(id));
        if !attrs.is_empty() {
            self.output.push(' ');
            write_attrs(&mut self.output, attrs);
        }
        self.output.push_str(";\n");
        self
    }

    pub fn edge(&mut self, from: &str, to: &str) -> &mut Self {
        self.write_indent();
        let _ = writeln!(self.output, "\"{}\" -> \"{}\";", escape(from), escape(to));
        self
    }

    /// Open a `subgraph cluster_<id>` block; close it with [`Self::end_cluster`].
    pub fn start_cluster(&mut self, id: &str, label: &str) -> &mut Self {
        self.write_indent();
        let _ = writeln!(self.output, "subgraph cluster_{} {{", sanitize_id(id));
        self.indent += 1;
        self.attr("label", label)
    }

    pub fn end_cluster(&mut self) -> &mut Self {
        self.indent = self.indent.saturating_sub(1).max(1);
        self.write_indent();
        self.output.push_str("}\n");
        self
    }

    pub fn build(mut self) -> String {
        self.output.push_str("}\n");
        self.output
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("plain", "plain")]
    #[case("with \"quotes\"", "with \\\"quotes\\\"")]
    #[case("back\\slash", "back\\\\slash")]
    #[case("two\nlines", "two\\nlines")]
    fn test_escape(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape(input), expected);
    }

    #[rstest]
    #[case("api-gateway", "api_gateway")]
    #[case("Data Lake", "Data_Lake")]
    #[case("etl", "etl")]
    fn test_sanitize_id(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_id(input), expected);
    }

    #[test]
    fn test_build_document() {
        let mut dot = DotBuilder::new("StacksGraph");
        dot.attr("rankdir", "LR")
            .node_defaults(&[("shape", "box"), ("style", "filled")])
            .node("api-fn", &[("fillcolor", "green")])
            .node("db", &[])
            .edge("db", "api-fn");
        let output = dot.build();

        assert!(output.starts_with("digraph StacksGraph {\n"));
        assert!(output.contains("  rankdir=\"LR\";\n"));
        assert!(output.contains("  node [shape=\"box\", style=\"filled\"];\n"));
        assert!(output.contains("  \"api-fn\" [fillcolor=\"green\"];\n"));
        assert!(output.contains("  \"db\";\n"));
        assert!(output.contains("  \"db\" -> \"api-fn\";\n"));
        assert!(output.ends_with("}\n"));
    }

    #[test]
    fn test_html_label_passthrough() {
        let mut dot = DotBuilder::new("g");
        dot.node("api", &[("label", "<<font point-size=\"17\">api</font>>")]);
        let output = dot.build();
        assert!(output.contains("label=<<font point-size=\"17\">api</font>>"));
    }

    #[test]
    fn test_cluster_nesting() {
        let mut dot = DotBuilder::new("g");
        dot.start_cluster("api-svc", "api-svc").node("a", &[]).end_cluster();
        let output = dot.build();

        assert!(output.contains("  subgraph cluster_api_svc {\n"));
        assert!(output.contains("    label=\"api-svc\";\n"));
        assert!(output.contains("    \"a\";\n"));
        assert!(output.contains("  }\n"));
    }
}
