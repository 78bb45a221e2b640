use serde_json::json;
use std::fs;
use std::path::Path;
use wano::dsl::builder::{self, TemplateBuilder};
use wano::runtime::render::{RenderContext, StageSource, RENDERED_WANO_FILE};
use wano::{WanoError, WanoModelRoot};

fn write_template(dir: &Path, builder: TemplateBuilder) -> std::path::PathBuf {
    let path = dir.join("wano.xml");
    fs::write(&path, builder.build_xml()).expect("Failed to write template");
    path
}

#[test]
fn test_render_box_example() {
    let template_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let submit_dir = tempfile::tempdir().expect("Failed to create temp dir");

    fs::write(
        template_dir.path().join("md.in.tpl"),
        "steps = {{ wano.steps }}\ntitle = {{ wano.title }}\n",
    )
    .unwrap();
    let path = write_template(
        template_dir.path(),
        TemplateBuilder::new("box")
            .boxed("Box")
            .float("Lx", 25.0)
            .float("Ly", 25.0)
            .build()
            .node(builder::int("steps", 100))
            .string("title", "run-{{ wano.steps }}")
            .exec_command("md.sh {{ wano.steps }}")
            .input_file("md.in", "md.in.tpl")
            .output_file("out.log"),
    );

    let mut model = WanoModelRoot::construct_from_wano(&path).expect("Failed to load");
    model.set_value("Box.Lx", "40.0").unwrap();

    let ctx = RenderContext::new(submit_dir.path());
    let output = model.render(&ctx).expect("Failed to render");

    assert_eq!(
        output.data,
        json!({"Box": {"Lx": 40.0, "Ly": 25.0}, "steps": 100, "title": "run-100"})
    );

    let md_in = fs::read_to_string(ctx.inputs_dir().join("md.in")).unwrap();
    assert!(md_in.contains("steps = 100"));
    assert!(md_in.contains("title = run-100"));

    let rendered: serde_yaml::Value =
        serde_yaml::from_str(&fs::read_to_string(ctx.inputs_dir().join(RENDERED_WANO_FILE)).unwrap())
            .unwrap();
    assert_eq!(rendered["Box"]["Lx"].as_f64(), Some(40.0));

    let descriptor = output.descriptor;
    assert_eq!(descriptor.wano, "box");
    assert_eq!(descriptor.command, "md.sh 100");
    assert_eq!(descriptor.stage_out, vec!["out.log"]);
    let logical: Vec<&str> = descriptor
        .stage_in
        .iter()
        .map(|s| s.logical_name.as_str())
        .collect();
    assert_eq!(logical, vec!["md.in", RENDERED_WANO_FILE]);
}

#[test]
fn test_two_level_references_resolve() {
    let submit_dir = tempfile::tempdir().unwrap();
    let model = WanoModelRoot::from_element(
        TemplateBuilder::new("chain")
            .string("a", "{{ wano.b }}")
            .string("b", "{{ wano.c }}")
            .string("c", "x")
            .build(),
        None,
    )
    .unwrap();

    let output = model.render(&RenderContext::new(submit_dir.path())).unwrap();
    assert_eq!(output.data, json!({"a": "x", "b": "x", "c": "x"}));
}

#[test]
fn test_deeper_chains_are_unresolved() {
    let submit_dir = tempfile::tempdir().unwrap();
    let model = WanoModelRoot::from_element(
        TemplateBuilder::new("chain")
            .string("a", "{{ wano.b }}")
            .string("b", "{{ wano.c }}")
            .string("c", "{{ wano.d }}")
            .string("d", "x")
            .build(),
        None,
    )
    .unwrap();

    match model.render(&RenderContext::new(submit_dir.path())) {
        Err(WanoError::UnresolvedPlaceholder { path, .. }) => assert_eq!(path, "a"),
        other => panic!("expected UnresolvedPlaceholder, got {other:?}"),
    }
}

#[test]
fn test_files_are_staged() {
    let template_dir = tempfile::tempdir().unwrap();
    let submit_dir = tempfile::tempdir().unwrap();
    let structure = template_dir.path().join("water.xyz");
    fs::write(&structure, "3\nwater\n").unwrap();

    let model = WanoModelRoot::from_element(
        TemplateBuilder::new("files")
            .node(builder::file("structure", "mol.xyz", &structure.to_string_lossy(), true))
            .node(builder::file("previous", "prev.dat", "step1/out.dat", false))
            .build(),
        Some(template_dir.path().to_path_buf()),
    )
    .unwrap();

    let ctx = RenderContext::new(submit_dir.path());
    let output = model.render(&ctx).unwrap();

    assert_eq!(
        output.data,
        json!({
            "structure": "mol.xyz",
            "previous": "${STORAGE}/workflow_data/step1/out.dat"
        })
    );
    assert_eq!(
        fs::read_to_string(ctx.inputs_dir().join("mol.xyz")).unwrap(),
        "3\nwater\n"
    );
    assert!(output.descriptor.stage_in.iter().any(|s| s.logical_name == "prev.dat"
        && s.source == StageSource::Storage("${STORAGE}/workflow_data/step1/out.dat".to_string())));
}

#[test]
fn test_storage_prefix_is_configurable() {
    let submit_dir = tempfile::tempdir().unwrap();
    let model = WanoModelRoot::from_element(
        TemplateBuilder::new("files")
            .node(builder::file("previous", "prev.dat", "/step1/out.dat", false))
            .build(),
        None,
    )
    .unwrap();

    let ctx = RenderContext::new(submit_dir.path()).with_storage_prefix("/data/");
    let output = model.render(&ctx).unwrap();
    assert_eq!(output.data, json!({"previous": "/data/step1/out.dat"}));
}

#[test]
fn test_empty_local_file_is_invalid() {
    let submit_dir = tempfile::tempdir().unwrap();
    let model = WanoModelRoot::from_element(
        TemplateBuilder::new("files")
            .node(builder::file("structure", "mol.xyz", "", true))
            .build(),
        None,
    )
    .unwrap();

    assert!(matches!(
        model.render(&RenderContext::new(submit_dir.path())),
        Err(WanoError::InvalidValue { path, .. }) if path == "structure"
    ));
}

#[test]
fn test_inactive_switch_branch_is_not_rendered() {
    let submit_dir = tempfile::tempdir().unwrap();
    let mut model = WanoModelRoot::from_element(
        TemplateBuilder::new("switch")
            .node(builder::dropdown("Method", &["DFT", "MD"], 0))
            .node(builder::switch(
                "Settings",
                "Method",
                vec![
                    ("DFT", vec![builder::string("functional", "PBE")]),
                    ("MD", vec![builder::string("ensemble", "{{ wano.Method }}-NVT")]),
                ],
            ))
            .build(),
        None,
    )
    .unwrap();
    model.set_value("Method", "MD").unwrap();

    let output = model.render(&RenderContext::new(submit_dir.path())).unwrap();
    assert_eq!(
        output.data,
        json!({"Method": "MD", "Settings": {"ensemble": "MD-NVT"}})
    );
}

#[test]
fn test_logical_names_stay_inside_inputs() {
    let template_dir = tempfile::tempdir().unwrap();
    let outer = tempfile::tempdir().unwrap();
    let submit_dir = outer.path().join("a").join("b");
    fs::write(template_dir.path().join("a.txt"), "payload").unwrap();

    for logical in ["../../escaped.txt", "/tmp/escaped.txt"] {
        let model = WanoModelRoot::from_element(
            TemplateBuilder::new("files")
                .node(builder::file("s", logical, "a.txt", true))
                .build(),
            Some(template_dir.path().to_path_buf()),
        )
        .unwrap();

        match model.render(&RenderContext::new(&submit_dir)) {
            Err(WanoError::InvalidValue { path, value, .. }) => {
                assert_eq!(path, "s");
                assert_eq!(value, logical);
            }
            other => panic!("expected InvalidValue for {logical}, got {other:?}"),
        }
    }
    assert!(!outer.path().join("a").join("escaped.txt").exists());
    assert!(!submit_dir.join("escaped.txt").exists());
}

#[test]
fn test_input_file_cannot_escape_inputs() {
    let template_dir = tempfile::tempdir().unwrap();
    let submit_dir = tempfile::tempdir().unwrap();
    fs::write(template_dir.path().join("md.in.tpl"), "x").unwrap();
    let path = write_template(
        template_dir.path(),
        TemplateBuilder::new("box")
            .node(builder::int("steps", 1))
            .input_file("../md.in", "md.in.tpl"),
    );

    let model = WanoModelRoot::construct_from_wano(&path).unwrap();
    assert!(matches!(
        model.render(&RenderContext::new(submit_dir.path())),
        Err(WanoError::InvalidValue { .. })
    ));
    assert!(!submit_dir.path().join("md.in").exists());
}
