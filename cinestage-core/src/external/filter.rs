// cinestage-core/src/external/filter.rs
//
// Typed builder for ffmpeg filter graphs. Option values are escaped for both
// the option parser and the filtergraph parser, so expressions such as
// `gt(scene,0.1)` and paths containing colons survive intact.

use std::fmt::Write;

/// A single filter, e.g. `scale=w=1920:h=1080:flags=lanczos`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    name: String,
    params: Vec<(Option<String>, String)>,
}

impl Filter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
        }
    }

    /// Adds a `key=value` option.
    pub fn kv(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((Some(key.to_string()), value.to_string()));
        self
    }

    /// Adds a positional option.
    pub fn pos(mut self, value: impl ToString) -> Self {
        self.params.push((None, value.to_string()));
        self
    }

    fn render_into(&self, out: &mut String) {
        out.push_str(&self.name);
        for (i, (key, value)) in self.params.iter().enumerate() {
            out.push(if i == 0 { '=' } else { ':' });
            if let Some(key) = key {
                out.push_str(key);
                out.push('=');
            }
            escape_value(value, out);
        }
    }
}

/// A linear chain of filters with optional input and output pad labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    inputs: Vec<String>,
    filters: Vec<Filter>,
    outputs: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, label: &str) -> Self {
        self.inputs.push(sanitize_label(label));
        self
    }

    pub fn then(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn output(mut self, label: &str) -> Self {
        self.outputs.push(sanitize_label(label));
        self
    }

    fn render_into(&self, out: &mut String) {
        for label in &self.inputs {
            let _ = write!(out, "[{label}]");
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            filter.render_into(out);
        }
        for label in &self.outputs {
            let _ = write!(out, "[{label}]");
        }
    }
}

/// One or more chains joined with `;`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph made of a single unlabelled chain, as used with `-vf`.
    pub fn simple(filters: impl IntoIterator<Item = Filter>) -> Self {
        let chain = filters
            .into_iter()
            .fold(FilterChain::new(), |chain, f| chain.then(f));
        Self {
            chains: vec![chain],
        }
    }

    pub fn chain(mut self, chain: FilterChain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            chain.render_into(&mut out);
        }
        out
    }
}

// Two escaping levels: the option parser first, then the graph parser.
fn escape_value(value: &str, out: &mut String) {
    let mut option_level = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option_level.push('\\');
        }
        option_level.push(c);
    }
    for c in option_level.chars() {
        if matches!(c, '\\' | '\'' | ',' | ';' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
}

// Pad labels only carry stream specifiers and identifiers.
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_positional_and_keyed_options() {
        let graph = FilterGraph::simple([
            Filter::new("scale").pos(1920).pos(1080).kv("flags", "lanczos"),
            Filter::new("unsharp").pos(5).pos(5).pos("1.0").pos(5).pos(5).pos("0.0"),
        ]);
        assert_eq!(
            graph.render(),
            "scale=1920:1080:flags=lanczos,unsharp=5:5:1.0:5:5:0.0"
        );
    }

    #[test]
    fn escapes_expression_separators() {
        let graph = FilterGraph::simple([
            Filter::new("select").pos("gt(scene,0.1)"),
            Filter::new("showinfo"),
        ]);
        assert_eq!(graph.render(), "select=gt(scene\\,0.1),showinfo");
    }

    #[test]
    fn renders_labelled_multi_chain_graph() {
        let graph = FilterGraph::new()
            .chain(
                FilterChain::new()
                    .input("0:v")
                    .then(Filter::new("setpts").pos("PTS-STARTPTS"))
                    .output("main"),
            )
            .chain(
                FilterChain::new()
                    .input("main")
                    .input("1:v")
                    .then(Filter::new("libvmaf").kv("log_path", "/tmp/a:b.json")),
            );
        assert_eq!(
            graph.render(),
            "[0:v]setpts=PTS-STARTPTS[main];[main][1:v]libvmaf=log_path=/tmp/a\\\\:b.json"
        );
    }
}
