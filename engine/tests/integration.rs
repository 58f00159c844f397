use std::fs;
use std::path::Path;

use engine::{
    BlockState, CalcExecutor, Engine, Error, Execution, Executor, Expansion, Options, Pipeline,
    ScriptError, SessionState, Value,
};
use tempfile::TempDir;
use weave::{ModifierRegistry, SourceMap, classify};

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn expand_file(dir: &Path, root: &str) -> Result<Expansion, Error> {
    let mut sources = SourceMap::new();
    Pipeline::default().expand(&mut sources, &dir.join(root), dir, &mut CalcExecutor::new())
}

fn expand(text: &str) -> Result<Expansion, Error> {
    let mut sources = SourceMap::new();
    Pipeline::default().expand_source(
        &mut sources,
        "main.md",
        text,
        Path::new("."),
        &mut CalcExecutor::new(),
    )
}

fn markdown(text: &str) -> String {
    expand(text).expect("expansion failed").markdown
}

/// Counts executions without running anything.
#[derive(Default)]
struct Recording {
    calls: usize,
}

impl Executor for Recording {
    fn language(&self) -> &str {
        "calc"
    }

    fn execute(&mut self, _code: &str, _session: &mut SessionState) -> Execution {
        self.calls += 1;
        Execution::default()
    }
}

#[test]
fn included_binding_drives_a_later_conditional() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.md", "!include b.md\n!if x == 3\nVisible\n!endif\n");
    write(tmp.path(), "b.md", "```calc\nx = 3\n```\n");

    let expansion = expand_file(tmp.path(), "a.md").expect("expansion failed");
    assert_eq!(expansion.markdown, "```calc\nx = 3\n```\nVisible\n");
    assert_eq!(expansion.markdown.matches("Visible").count(), 1);
    assert!(!expansion.markdown.contains("!include"));
    assert!(!expansion.markdown.contains("!if"));
}

#[test]
fn guard_before_the_binding_block_fails() {
    let err = expand("!if y == 1\nA\n!endif\n```calc\ny = 1\n```\n").expect_err("undefined");
    let Error::UndefinedReference { name, span, .. } = err else {
        panic!("expected UndefinedReference, got {err:?}");
    };
    assert_eq!(name, "y");
    assert_eq!(span.line, 1);

    assert_eq!(markdown("```calc\ny = 1\n```\n!if y == 1\nA\n!endif\n"), "```calc\ny = 1\n```\nA\n");
}

#[test]
fn long_sums_evaluate() {
    let sum = vec!["1"; 300].join(" + ");
    let doc = format!("```calc {{silent}}\nx = {sum}\n```\n!if x == 300\nok\n!endif\n");
    assert_eq!(markdown(&doc), "ok\n");
}

#[test]
fn block_order_is_document_order() {
    for n in 0..6 {
        let source: String = (0..n)
            .map(|i| format!("Step {i}\n```calc\nprint({i})\n```\n"))
            .collect::<Vec<_>>()
            .join("\n");
        let output = markdown(&format!("intro\n{source}"));
        let mut last = 0;
        for i in 0..n {
            let at = output
                .find(&format!("```text\n{i}\n```"))
                .unwrap_or_else(|| panic!("missing output of block {i}"));
            assert!(at >= last, "block {i} out of order");
            last = at;
        }
    }
    assert_eq!(markdown("just prose\n"), "just prose\n");
}

#[test]
fn conflicts_are_rejected_before_anything_runs() {
    let mut sources = SourceMap::new();
    let mut executor = Recording::default();
    let err = Pipeline::default()
        .expand_source(
            &mut sources,
            "main.md",
            "```calc\nx = 1\n```\n```calc {no-exec, silent}\ny = 2\n```\n",
            Path::new("."),
            &mut executor,
        )
        .expect_err("conflict");
    assert!(matches!(err, Error::Weave(weave::Error::ModifierConflict { .. })));
    assert_eq!(executor.calls, 0);
}

#[test]
fn artifacts_are_named_by_position() {
    let source = "```calc\nprint(\"data\")\n```\n\
                  ```calc\nbar_chart(\"Sales\", 3, 5, 2)\nsave(\"csv\", \"a,b\")\n```\n";
    let first = expand(source).expect("first run");
    let second = expand(source).expect("second run");
    assert_eq!(first, second);

    let names: Vec<&str> = first.artifacts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["block-001-1.svg", "block-001-2.csv"]);
    assert!(first.markdown.contains("![](artifacts/block-001-1.svg)\n"));
    assert!(first.markdown.contains("![](artifacts/block-001-2.csv)\n"));
}

#[test]
fn artifact_settings_are_honoured() {
    let options = Options {
        artifact_dir: "figs".to_string(),
        artifact_prefix: "fig".to_string(),
        ..Options::default()
    };
    let mut sources = SourceMap::new();
    let expansion = Pipeline::new(options)
        .expand_source(
            &mut sources,
            "main.md",
            "```calc {artifact-only}\nbar_chart(\"t\", 1)\n```\n",
            Path::new("."),
            &mut CalcExecutor::new(),
        )
        .unwrap();
    assert_eq!(expansion.markdown, "![](figs/fig-000-1.svg)\n");
}

#[test]
fn failure_reports_position_and_partial_output() {
    let err = expand("# Title\n\n```calc\nprint(\"partial\")\nx = missing\n```\n")
        .expect_err("failure");
    let Error::ExecutionFailure {
        index,
        span,
        line,
        partial_output,
        error,
    } = err
    else {
        panic!("expected ExecutionFailure, got {err:?}");
    };
    assert_eq!(index, 0);
    assert_eq!(span.line, 3);
    assert_eq!(line, Some(5));
    assert_eq!(partial_output, "partial\n");
    assert_eq!(error, ScriptError::UndefinedVariable("missing".to_string()));
}

#[test]
fn engine_stops_at_the_first_failure() {
    let document = weave::parser::Parser::new(
        "```calc\na = 1\n```\n```calc\nfail(\"stop\")\n```\n```calc\nb = 2\n```\n",
        0,
    )
    .parse()
    .unwrap();
    let classified = classify(document, &ModifierRegistry::new(), "calc").unwrap();

    let mut executor = CalcExecutor::new();
    let mut engine = Engine::new(&mut executor);
    let err = engine.run(&classified).expect_err("failure");
    assert!(matches!(err, Error::ExecutionFailure { index: 1, .. }));
    assert_eq!(engine.state(0), Some(BlockState::Succeeded));
    assert_eq!(engine.state(1), Some(BlockState::Failed));
    assert_eq!(engine.state(2), Some(BlockState::Pending));
    assert_eq!(engine.session().get("a"), Some(&Value::Number(1.0)));
    assert!(engine.session().get("b").is_none());
}

#[test]
fn false_outer_guard_skips_inner_guards() {
    let output = markdown("!if false\n!if never_bound\nX\n!endif\n!endif\nY\n");
    assert_eq!(output, "Y\n");
}

#[test]
fn dead_branches_do_not_execute() {
    let output = markdown(
        "```calc {silent}\nx = 1\n```\n!if x == 2\n```calc\nfail(\"unreachable\")\n```\n!endif\ndone\n",
    );
    assert_eq!(output, "done\n");
}

#[test]
fn modifiers_control_what_is_shown() {
    assert_eq!(
        markdown("```calc\nprint(1)\n```\n"),
        "```calc\nprint(1)\n```\n\n```text\n1\n```\n"
    );
    assert_eq!(
        markdown("```calc {hide-output}\nprint(1)\n```\n"),
        "```calc\nprint(1)\n```\n"
    );
    assert_eq!(markdown("```calc {output-only}\nprint(1)\n```\n"), "```text\n1\n```\n");
    assert_eq!(
        markdown("```calc {silent}\nx = 5\nprint(x)\n```\n!if x == 5\nshown\n!endif\n"),
        "shown\n"
    );
    assert_eq!(
        markdown("```calc {artifact-only}\nprint(\"hidden\")\nbar_chart(\"t\", 1, 2)\n```\n"),
        "![](artifacts/block-000-1.svg)\n"
    );
    assert_eq!(
        markdown("```calc {no-exec}\nfail(\"never\")\n```\n"),
        "```calc\nfail(\"never\")\n```\n"
    );
}

#[test]
fn other_languages_pass_through() {
    assert_eq!(markdown("```python\nprint(1)\n```\n"), "```python\nprint(1)\n```\n");
}

#[test]
fn blocks_in_list_items_stay_in_them() {
    assert_eq!(
        markdown("- item\n\n  ```calc\n  print(\"hi\")\n  ```\n"),
        "- item\n\n  ```calc\n  print(\"hi\")\n  ```\n\n  ```text\n  hi\n  ```\n"
    );
}

#[test]
fn blocks_in_blockquotes_stay_quoted() {
    let out = markdown("> ```calc\n> print(1)\n> ```\n");
    assert_eq!(out, "> ```calc\n> print(1)\n> ```\n>\n> ```text\n> 1\n> ```\n");
    assert!(out.lines().all(|line| line.starts_with('>')), "{out}");
}

#[test]
fn unexecuted_blocks_in_blockquotes_stay_quoted() {
    assert_eq!(
        markdown("> ```python\n> a = 1\n>\n> b = 2\n> ```\n"),
        "> ```python\n> a = 1\n>\n> b = 2\n> ```\n"
    );
    assert_eq!(
        markdown("> ```calc {no-exec}\n> x = 1\n> ```\n"),
        "> ```calc\n> x = 1\n> ```\n"
    );
}

#[test]
fn tilde_fences_in_list_items_stay_in_them() {
    assert_eq!(
        markdown("- item\n\n  ~~~calc\n  print(2)\n  ~~~\n"),
        "- item\n\n  ~~~calc\n  print(2)\n  ~~~\n\n  ```text\n  2\n  ```\n"
    );
}

#[test]
fn guard_type_errors_fail_the_run() {
    let err = expand("```calc\nname = \"x\"\n```\n!if name > 1\nA\n!endif\n").expect_err("type");
    assert!(matches!(err, Error::GuardType { .. }));
}

#[test]
fn write_persists_document_and_artifacts() {
    let tmp = TempDir::new().unwrap();
    let expansion = expand("```calc\nsave(\"txt\", \"hello\")\n```\n").unwrap();
    let output = tmp.path().join("doc.md");
    let artifacts = tmp.path().join("artifacts");
    expansion.write(&output, &artifacts).unwrap();

    assert_eq!(fs::read_to_string(&output).unwrap(), expansion.markdown);
    assert_eq!(
        fs::read_to_string(artifacts.join("block-000-1.txt")).unwrap(),
        "hello"
    );
}
