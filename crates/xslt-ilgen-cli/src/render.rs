use anyhow::Result;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;
use std::fmt::Write;
use xslt_ilgen::{Compilation, MethodId, Program, StaticData};
use xslt_ir::IrTree;

#[derive(Serialize)]
struct JsonOutput<'a> {
    root: MethodId,
    rewrites: usize,
    program: &'a Program,
    static_data: &'a StaticData,
    #[serde(skip_serializing_if = "Option::is_none")]
    optimized_tree: Option<&'a IrTree>,
}

pub(crate) fn json(compilation: &Compilation, tree: Option<&IrTree>) -> Result<String> {
    let output = JsonOutput {
        root: compilation.root,
        rewrites: compilation.rewrites,
        program: &compilation.program,
        static_data: &compilation.static_data,
        optimized_tree: tree,
    };
    let mut text = serde_json::to_string_pretty(&output)?;
    text.push('\n');
    Ok(text)
}

pub(crate) fn text(compilation: &Compilation, tree: Option<&IrTree>) -> String {
    let mut out = String::new();
    let header = format!("; root M{}, {} rewrites", compilation.root.0, compilation.rewrites);
    let _ = writeln!(out, "{}", dimmed(&header));
    for line in compilation.program.to_string().lines() {
        let _ = writeln!(out, "{}", highlight(line));
    }
    render_static_data(&mut out, &compilation.static_data);
    if let Some(tree) = tree {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", heading("; optimized tree"));
        match tree.to_json() {
            Ok(json) => {
                let _ = writeln!(out, "{json}");
            }
            Err(error) => tracing::warn!(%error, "cannot render optimized tree"),
        }
    }
    out
}

fn render_static_data(out: &mut String, data: &StaticData) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", heading(".data"));
    for (i, name) in data.names.items().iter().enumerate() {
        let qname = if name.prefix.is_empty() {
            format!("{{{}}}{}", name.ns, name.local)
        } else {
            format!("{{{}}}{}:{}", name.ns, name.prefix, name.local)
        };
        let _ = writeln!(out, "  name {i}: {}", value(&qname));
    }
    for (i, filter) in data.name_filters.items().iter().enumerate() {
        let local = filter.local.as_deref().unwrap_or("*");
        let ns = filter.ns.as_deref().unwrap_or("*");
        let _ = writeln!(out, "  filter {i}: {}", value(&format!("{{{ns}}}{local}")));
    }
    for (i, mappings) in data.prefix_mappings.items().iter().enumerate() {
        let joined = mappings.iter().map(|m| format!("{}={}", m.prefix, m.ns)).collect::<Vec<_>>().join(" ");
        let _ = writeln!(out, "  prefixes {i}: {}", value(&joined));
    }
    for (i, collation) in data.collations.items().iter().enumerate() {
        let _ = writeln!(out, "  collation {i}: {}", value(collation));
    }
    for (i, type_name) in data.early_bound_types.items().iter().enumerate() {
        let _ = writeln!(out, "  extension {i}: {}", value(type_name));
    }
    for (i, ty) in data.types.items().iter().enumerate() {
        let _ = writeln!(out, "  type {i}: {}", value(&ty.to_string()));
    }
    let _ = writeln!(out, "  globals: {}, indexes: {}", data.global_count, data.index_count);
}

fn highlight(line: &str) -> String {
    if line.starts_with(".method") {
        heading(line)
    } else if line.starts_with('L') && line.ends_with(':') {
        line.if_supports_color(Stream::Stdout, |t| t.bold().fg_rgb::<241, 149, 255>().to_string()).to_string()
    } else if line.trim_start().starts_with(".local") || line.trim_start().starts_with(".line") {
        dimmed(line)
    } else {
        line.to_string()
    }
}

fn heading(text: &str) -> String {
    text.if_supports_color(Stream::Stdout, |t| t.bold().fg_rgb::<79, 166, 255>().to_string()).to_string()
}

fn value(text: &str) -> String {
    text.if_supports_color(Stream::Stdout, |t| t.fg_rgb::<136, 192, 74>().to_string()).to_string()
}

fn dimmed(text: &str) -> String {
    text.if_supports_color(Stream::Stdout, |t| t.dimmed().to_string()).to_string()
}
