use anyhow::Result;
use proflow::{CommandOutput, InstrumentationReport, SamplingReport};
use serde::Serialize;
use serde_json::Value;

pub struct CliLogger {
    json: bool,
    no_color: bool,
}

impl CliLogger {
    pub fn new(json: bool, no_color: bool) -> Self {
        Self { json, no_color }
    }

    pub fn print_output(&self, output: &CommandOutput) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(output)?);
            return Ok(());
        }
        match output {
            CommandOutput::Sampling(report) => self.print_sampling(report),
            CommandOutput::Instrumentation(report) => self.print_instrumentation(report),
            other => self.print_serialized(other),
        }
    }

    fn print_serialized<T: Serialize>(&self, value: &T) -> Result<()> {
        let rendered = render_value(&serde_json::to_value(value)?, 0);
        println!("{rendered}");
        Ok(())
    }

    fn print_sampling(&self, report: &SamplingReport) -> Result<()> {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {}\n",
            self.style("proflow", "36;1"),
            self.style("sampling", "37;1"),
            self.style("OK", "32;1")
        ));
        out.push_str(&format!("{} {}\n", self.style("binary", "90"), report.binary.display()));
        out.push_str(&format!("{} {}\n", self.style("trace", "90"), report.raw_trace.display()));
        out.push_str(&format!("{} {}\n", self.style("stacks", "90"), report.folded_stacks));
        out.push_str(&format!(
            "{} {}\n",
            self.style("flamegraph", "90"),
            report.flamegraph.display()
        ));
        println!("{}", out.trim_end());
        Ok(())
    }

    fn print_instrumentation(&self, report: &InstrumentationReport) -> Result<()> {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {}\n",
            self.style("proflow", "36;1"),
            self.style("instrumentation", "37;1"),
            self.style("OK", "32;1")
        ));
        out.push_str(&format!("{} {}\n", self.style("binary", "90"), report.binary.display()));
        out.push_str(&format!("{} {}\n", self.style("cleaned", "90"), report.cleaned.len()));
        for input in &report.report.inputs {
            out.push_str(&format!("{} {}\n", self.style("input", "90"), input.display()));
        }
        out.push_str(&format!(
            "{} top {} in {}\n",
            self.style("hot lines", "33;1"),
            report.report.limit,
            report.report.source_dir.display()
        ));
        let lines = report.report.pretty();
        if !lines.is_empty() {
            out.push_str(&lines);
        }
        println!("{}", out.trim_end());
        Ok(())
    }

    pub fn print_error(&self, msg: &str) {
        if self.json {
            let out = serde_json::json!({
                "status": "error",
                "code": "error",
                "message": msg,
            });
            println!("{out}");
            return;
        }
        eprintln!("{} {msg}", self.style("error", "31;1"));
    }

    pub fn print_warning(&self, msg: &str) {
        if self.json {
            let out = serde_json::json!({
                "status": "warning",
                "code": "warning",
                "message": msg,
            });
            eprintln!("{out}");
            return;
        }
        eprintln!("{} {msg}", self.style("warn", "33;1"));
    }

    fn style(&self, text: &str, ansi: &str) -> String {
        if self.no_color {
            return text.to_string();
        }
        format!("\x1b[{ansi}m{text}\x1b[0m")
    }
}

fn render_value(value: &Value, indent: usize) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Number(v) => v.to_string(),
        Value::String(v) => v.clone(),
        Value::Array(items) => render_array(items, indent),
        Value::Object(map) => render_object(map, indent),
    }
}

fn render_array(items: &[Value], indent: usize) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }

    let pad = " ".repeat(indent);
    let mut out = String::new();
    for item in items {
        match item {
            Value::Object(_) | Value::Array(_) => {
                out.push_str(&format!("{pad}-\n{}\n", render_value(item, indent + 2)));
            }
            _ => out.push_str(&format!("{pad}- {}\n", render_value(item, indent + 2))),
        }
    }
    out.trim_end().to_string()
}

fn render_object(map: &serde_json::Map<String, Value>, indent: usize) -> String {
    if map.is_empty() {
        return "{}".to_string();
    }

    let pad = " ".repeat(indent);
    let mut out = String::new();
    for (key, value) in map {
        match value {
            Value::Object(_) | Value::Array(_) => {
                out.push_str(&format!("{pad}{key}:\n{}\n", render_value(value, indent + 2)));
            }
            _ => out.push_str(&format!("{pad}{key}: {}\n", render_value(value, indent + 2))),
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_nests_objects_and_arrays() {
        let value = serde_json::json!({
            "pattern": "cachegrind.out.*",
            "removed": ["a", "b"],
        });
        assert_eq!(
            render_value(&value, 0),
            "pattern: cachegrind.out.*\nremoved:\n  - a\n  - b"
        );
    }

    #[test]
    fn style_is_plain_without_color() {
        let logger = CliLogger::new(false, true);
        assert_eq!(logger.style("ok", "32;1"), "ok");
        assert_eq!(render_value(&serde_json::json!([]), 0), "[]");
    }
}
