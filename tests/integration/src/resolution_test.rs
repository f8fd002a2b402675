//! End-to-end resolution scenarios
//!
//! Exercises the complete flow over fixture stack trees: discovery ->
//! import expansion -> deferred merge -> function evaluation -> final
//! schema emission.

use pretty_assertions::assert_eq;
use serde_yaml::Value;
use stack_core::{Assembler, Error};
use stack_functions::{Evaluator, OutputBackend, OutputLookupError};
use stack_schema::{Cancellation, ListMergeStrategy, ResolvedComponent, Settings};
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn settings(dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.base_path = dir.to_path_buf();
    settings.stacks.base_path = dir.to_path_buf();
    settings.stacks.included_paths = vec!["**/*.yaml".to_string()];
    settings
}

/// Catalog/mixin layering: the stack file imports a catalog which imports
/// a mixin; overrides follow import depth.
#[test]
fn layered_imports_resolve_with_stack_overrides() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "mixins/region.yaml",
        concat!(
            "vars:\n",
            "  region: us-east-1\n",
            "  dns_zone: example.com\n",
        ),
    );
    write(
        temp.path(),
        "catalog/vpc.yaml",
        concat!(
            "import:\n",
            "  - mixins/region\n",
            "components:\n",
            "  terraform:\n",
            "    vpc:\n",
            "      vars:\n",
            "        cidr: 10.0.0.0/16\n",
            "        nat_gateways: 1\n",
        ),
    );
    write(
        temp.path(),
        "orgs/acme/dev.yaml",
        concat!(
            "import:\n",
            "  - catalog/vpc\n",
            "vars:\n",
            "  stage: dev\n",
            "components:\n",
            "  terraform:\n",
            "    vpc:\n",
            "      vars:\n",
            "        nat_gateways: 3\n",
        ),
    );

    let settings = settings(temp.path());
    let evaluator = Evaluator::new();
    let assembler = Assembler::new(&settings, &evaluator);
    let out = assembler.resolve("dev", "vpc", &Cancellation::new()).unwrap();

    assert_eq!(out.vars.get("stage"), Some(&Value::String("dev".into())));
    assert_eq!(
        out.vars.get("region"),
        Some(&Value::String("us-east-1".into()))
    );
    assert_eq!(
        out.vars.get("cidr"),
        Some(&Value::String("10.0.0.0/16".into()))
    );
    assert_eq!(out.vars.get("nat_gateways"), Some(&Value::Number(3.into())));
}

#[test]
fn import_cycle_fails_before_any_merge() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "dev.yaml",
        "import: [catalog/a]\ncomponents:\n  terraform:\n    vpc:\n      vars: {}\n",
    );
    write(temp.path(), "catalog/a.yaml", "import: [catalog/b]\n");
    write(temp.path(), "catalog/b.yaml", "import: [catalog/a]\n");

    let settings = settings(temp.path());
    let evaluator = Evaluator::new();
    let assembler = Assembler::new(&settings, &evaluator);
    let err = assembler
        .resolve("dev", "vpc", &Cancellation::new())
        .unwrap_err();

    match err {
        Error::CyclicImport { cycle } => {
            assert!(cycle.iter().any(|p| p.ends_with("a.yaml")));
            assert!(cycle.iter().any(|p| p.ends_with("b.yaml")));
        }
        other => panic!("expected cyclic import, got {other}"),
    }
}

/// Precedence across three template layers under "replace": only the
/// highest-rank function is evaluated and wins.
#[test]
fn deferred_precedence_selects_the_last_function() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "mixins/one.yaml",
        "components:\n  terraform:\n    app:\n      vars:\n        config: !template value1\n",
    );
    write(
        temp.path(),
        "mixins/two.yaml",
        "components:\n  terraform:\n    app:\n      vars:\n        config: !template value2\n",
    );
    write(
        temp.path(),
        "dev.yaml",
        concat!(
            "import:\n",
            "  - mixins/one\n",
            "  - mixins/two\n",
            "components:\n",
            "  terraform:\n",
            "    app:\n",
            "      vars:\n",
            "        config: !template value3\n",
        ),
    );

    let settings = settings(temp.path());
    let evaluator = Evaluator::new();
    let assembler = Assembler::new(&settings, &evaluator);
    let out = assembler.resolve("dev", "app", &Cancellation::new()).unwrap();

    assert_eq!(
        out.vars.get("config"),
        Some(&Value::String("value3".into()))
    );
}

/// A nested function resolves independently without disturbing siblings.
#[test]
fn nested_function_does_not_affect_siblings() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "dev.yaml",
        concat!(
            "components:\n",
            "  terraform:\n",
            "    app:\n",
            "      vars:\n",
            "        level1:\n",
            "          level2:\n",
            "            computed: !env APP_TIER\n",
            "            regular: untouched\n",
        ),
    );

    let settings = settings(temp.path());
    let evaluator = Evaluator::new().with_env("APP_TIER", "backend");
    let assembler = Assembler::new(&settings, &evaluator);
    let out = assembler.resolve("dev", "app", &Cancellation::new()).unwrap();

    let level2 = out
        .vars
        .get("level1")
        .and_then(Value::as_mapping)
        .and_then(|m| m.get("level2"))
        .and_then(Value::as_mapping)
        .unwrap();
    assert_eq!(level2.get("computed"), Some(&Value::String("backend".into())));
    assert_eq!(level2.get("regular"), Some(&Value::String("untouched".into())));
}

struct MapBackend {
    outputs: HashMap<(String, String, String), Value>,
}

impl MapBackend {
    fn with_output(component: &str, stack: &str, name: &str, value: Value) -> Self {
        let mut outputs = HashMap::new();
        outputs.insert(
            (component.to_string(), stack.to_string(), name.to_string()),
            value,
        );
        Self { outputs }
    }
}

impl OutputBackend for MapBackend {
    fn output(
        &self,
        component: &str,
        stack: &str,
        name: &str,
    ) -> Result<Value, OutputLookupError> {
        self.outputs
            .get(&(component.to_string(), stack.to_string(), name.to_string()))
            .cloned()
            .ok_or(OutputLookupError::NotAvailable)
    }

    fn state(
        &self,
        component: &str,
        stack: &str,
        attribute: &str,
    ) -> Result<Value, OutputLookupError> {
        self.output(component, stack, attribute)
    }
}

/// The multiline round-trip invariant: a three-line value crossing a
/// `terraform.output` boundary survives resolution and re-serialization
/// byte-for-byte.
#[test]
fn multiline_output_round_trips_exactly() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "dev.yaml",
        concat!(
            "components:\n",
            "  terraform:\n",
            "    app:\n",
            "      vars:\n",
            "        payload: !terraform.output producer prod payload\n",
        ),
    );

    // The transport delivers escaped newlines; resolution unescapes once.
    let backend = MapBackend::with_output(
        "producer",
        "prod",
        "payload",
        Value::String("bar\\nbaz\\nbongo\\n".to_string()),
    );
    let settings = settings(temp.path());
    let evaluator = Evaluator::new().with_backend(Box::new(backend));
    let assembler = Assembler::new(&settings, &evaluator);
    let out = assembler.resolve("dev", "app", &Cancellation::new()).unwrap();

    let expected = "bar\nbaz\nbongo\n";
    assert_eq!(out.vars.get("payload"), Some(&Value::String(expected.into())));
    assert_eq!(expected.matches('\n').count(), 3);

    let yaml = out.to_yaml().unwrap();
    let reparsed: ResolvedComponent = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(
        reparsed.vars.get("payload"),
        Some(&Value::String(expected.into()))
    );
}

/// Append strategy across imported layers concatenates list values.
#[test]
fn append_strategy_concatenates_imported_lists() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "catalog/base.yaml",
        "components:\n  terraform:\n    app:\n      vars:\n        subnets: [a, b]\n",
    );
    write(
        temp.path(),
        "dev.yaml",
        concat!(
            "import: [catalog/base]\n",
            "components:\n",
            "  terraform:\n",
            "    app:\n",
            "      vars:\n",
            "        subnets: [c]\n",
        ),
    );

    let mut settings = settings(temp.path());
    settings.list_merge_strategy = ListMergeStrategy::Append;
    let evaluator = Evaluator::new();
    let assembler = Assembler::new(&settings, &evaluator);
    let out = assembler.resolve("dev", "app", &Cancellation::new()).unwrap();

    let subnets: Vec<String> = out
        .vars
        .get("subnets")
        .and_then(Value::as_sequence)
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(subnets, vec!["a", "b", "c"]);
}

/// `!include` pulls an external file's sub-value into a document before
/// merging begins.
#[test]
fn include_directive_loads_external_values() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "defaults.json",
        "{\"network\": {\"cidr\": \"172.16.0.0/12\"}}\n",
    );
    write(
        temp.path(),
        "dev.yaml",
        concat!(
            "components:\n",
            "  terraform:\n",
            "    vpc:\n",
            "      vars:\n",
            "        cidr: !include 'defaults.json .network.cidr'\n",
        ),
    );

    let settings = settings(temp.path());
    let evaluator = Evaluator::new();
    let assembler = Assembler::new(&settings, &evaluator);
    let out = assembler.resolve("dev", "vpc", &Cancellation::new()).unwrap();

    assert_eq!(
        out.vars.get("cidr"),
        Some(&Value::String("172.16.0.0/12".into()))
    );
}
