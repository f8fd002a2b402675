//! JIT provisioning scenarios
//!
//! Exercises resolution handing its source descriptor to the provisioner,
//! the precedence of provisioned content over stale local copies, and the
//! content-hash idempotence check.

use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;
use stack_core::Assembler;
use stack_fs::NormalizedPath;
use stack_functions::Evaluator;
use stack_provision::{MANIFEST_FILE, Provisioner};
use stack_schema::{Cancellation, Settings};
use std::path::Path;

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

/// Resolve a component whose source points at a local module tree, then
/// provision it. A pre-existing working directory holding a marker file
/// must end up containing only remote-source content.
#[test]
fn provisioned_workdir_replaces_stale_local_content() {
    let temp = TempDir::new().unwrap();

    // Remote module source, as a local directory.
    temp.child("modules/vpc/main.tf")
        .write_str("resource \"aws_vpc\" \"this\" {}\n")
        .unwrap();

    // Stale local workdir that must not survive.
    temp.child("work/vpc/LOCAL_MARKER")
        .write_str("stale local copy\n")
        .unwrap();

    let source_uri = temp.path().join("modules/vpc").display().to_string();
    write(
        temp.path(),
        "stacks/dev.yaml",
        &format!(
            concat!(
                "components:\n",
                "  terraform:\n",
                "    vpc:\n",
                "      vars: {{stage: dev}}\n",
                "      source:\n",
                "        uri: {uri}\n",
                "        workdir:\n",
                "          enabled: true\n",
            ),
            uri = source_uri
        ),
    );

    let mut settings = settings(temp.path());
    settings.stacks.base_path = temp.path().join("stacks");
    let evaluator = Evaluator::new();
    let assembler = Assembler::new(&settings, &evaluator);
    let resolved = assembler.resolve("dev", "vpc", &Cancellation::new()).unwrap();

    let source = resolved.source.expect("component declares a source");
    assert!(source.workdir.enabled);

    let workdir = NormalizedPath::new(temp.path().join("work/vpc"));
    let out = Provisioner::new()
        .with_fetch_timeout(settings.fetch_timeout)
        .provision(&source, &workdir, &Cancellation::new())
        .unwrap();
    assert!(!out.reused);

    temp.child("work/vpc/LOCAL_MARKER")
        .assert(predicate::path::missing());
    temp.child("work/vpc/main.tf")
        .assert(predicate::path::exists());
    temp.child(format!("work/vpc/{MANIFEST_FILE}"))
        .assert(predicate::path::exists());
}

/// Re-provisioning identical content is a no-op; changed remote content
/// triggers a fresh fetch.
#[test]
fn reprovisioning_skips_on_matching_content_only() {
    let temp = TempDir::new().unwrap();
    temp.child("modules/app/main.tf")
        .write_str("module \"app\" {}\n")
        .unwrap();

    let source = stack_schema::SourceDescriptor::new(
        temp.path().join("modules/app").display().to_string(),
    );
    let workdir = NormalizedPath::new(temp.path().join("work/app"));
    let prov = Provisioner::new();
    let cancel = Cancellation::new();

    let first = prov.provision(&source, &workdir, &cancel).unwrap();
    assert!(!first.reused);

    let second = prov.provision(&source, &workdir, &cancel).unwrap();
    assert!(second.reused);
    assert_eq!(second.manifest.checksum, first.manifest.checksum);

    // Local tampering invalidates the content hash and forces a fetch.
    temp.child("work/app/main.tf")
        .write_str("module \"app\" { tampered = true }\n")
        .unwrap();
    let third = prov.provision(&source, &workdir, &cancel).unwrap();
    assert!(!third.reused);
    temp.child("work/app/main.tf")
        .assert(predicate::str::contains("module \"app\" {}"));
}
