use std::fs;
use std::sync::Arc;
use wano::cluster::{
    fetch_results, stage_submission, ClusterClient, LocalClusterClient, TransferRegistry,
    TransferStatus, EXEC_DESCRIPTOR_FILE,
};
use wano::dsl::builder::{self, TemplateBuilder};
use wano::runtime::render::{ExecutionDescriptor, RenderContext, RENDERED_WANO_FILE};
use wano::runtime::tables::Resources;
use wano::{WanoError, WanoModelRoot};

fn descriptor(stage_out: &[&str]) -> ExecutionDescriptor {
    ExecutionDescriptor {
        wano: "test".to_string(),
        command: "true".to_string(),
        resources: Resources::default(),
        stage_in: Vec::new(),
        stage_out: stage_out.iter().map(|s| s.to_string()).collect(),
    }
}

#[tokio::test]
async fn test_stage_submission_uploads_inputs() {
    let template_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let submit_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let cluster_dir = tempfile::tempdir().expect("Failed to create temp dir");

    fs::write(template_dir.path().join("in.tpl"), "n = {{ wano.n }}\n").unwrap();
    fs::write(template_dir.path().join("start.xyz"), "1\nH\n").unwrap();
    let model = WanoModelRoot::from_element(
        TemplateBuilder::new("stage")
            .node(builder::int("n", 7))
            .node(builder::file("geometry", "geo/start.xyz", "start.xyz", true))
            .input_file("in.dat", "in.tpl")
            .exec_command("run {{ wano.n }}")
            .build(),
        Some(template_dir.path().to_path_buf()),
    )
    .unwrap();
    let ctx = RenderContext::new(submit_dir.path());
    let output = model.render(&ctx).expect("Failed to render");

    let client = Arc::new(LocalClusterClient::new(cluster_dir.path()));
    client.connect().await.unwrap();
    let registry = Arc::new(TransferRegistry::new());

    let job_id = stage_submission(
        client.clone(),
        registry.clone(),
        submit_dir.path(),
        "jobs/run1",
        &output.descriptor,
    )
    .await
    .expect("Failed to stage");

    let remote_inputs = cluster_dir.path().join("jobs/run1/inputs");
    assert_eq!(
        fs::read_to_string(remote_inputs.join("in.dat")).unwrap().trim_end(),
        "n = 7"
    );
    assert!(remote_inputs.join("geo/start.xyz").exists());
    assert!(remote_inputs.join(RENDERED_WANO_FILE).exists());

    let submitted: ExecutionDescriptor = serde_yaml::from_str(
        &fs::read_to_string(cluster_dir.path().join("jobs/run1").join(EXEC_DESCRIPTOR_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(submitted.command, "run 7");

    assert_eq!(registry.in_flight(), 0);
    assert_eq!(registry.snapshot().len(), 3);
    assert_eq!(client.job_dir(&job_id).as_deref(), Some("jobs/run1"));

    let listing = client.list_dir("jobs/run1/inputs").await.unwrap();
    assert_eq!(listing, vec!["geo", "in.dat", RENDERED_WANO_FILE]);

    assert!(client.delete_job(&job_id).await.unwrap());
    assert!(!client.delete_job(&job_id).await.unwrap());
}

#[tokio::test]
async fn test_fetch_results_skips_missing_outputs() {
    let cluster_dir = tempfile::tempdir().unwrap();
    let local_dir = tempfile::tempdir().unwrap();
    let client = LocalClusterClient::new(cluster_dir.path());
    client.connect().await.unwrap();

    client.mkdir("jobs/run2").await.unwrap();
    fs::write(cluster_dir.path().join("jobs/run2/out.log"), "done\n").unwrap();

    let registry = TransferRegistry::new();
    let fetched = fetch_results(
        &client,
        &registry,
        "jobs/run2",
        &descriptor(&["out.log", "missing.txt"]),
        local_dir.path(),
    )
    .await
    .unwrap();

    assert_eq!(fetched, vec![local_dir.path().join("out.log")]);
    assert_eq!(fs::read_to_string(&fetched[0]).unwrap(), "done\n");
    let failed = registry
        .snapshot()
        .into_iter()
        .filter(|(_, state)| matches!(state.status, TransferStatus::Failed(_)))
        .count();
    assert_eq!(failed, 1);
}

#[tokio::test]
async fn test_fetch_results_refuses_names_outside_local_dir() {
    let cluster_dir = tempfile::tempdir().unwrap();
    let outer = tempfile::tempdir().unwrap();
    let local_dir = outer.path().join("results");
    let client = LocalClusterClient::new(cluster_dir.path());
    client.connect().await.unwrap();
    client.mkdir("jobs/run3").await.unwrap();
    fs::write(cluster_dir.path().join("jobs/run3/out.log"), "done\n").unwrap();

    let registry = TransferRegistry::new();
    for name in ["../out.log", "/tmp/out.log"] {
        let result = fetch_results(&client, &registry, "jobs/run3", &descriptor(&[name]), &local_dir).await;
        assert!(matches!(result, Err(WanoError::InvalidValue { .. })), "{name} accepted");
    }
    assert!(registry.snapshot().is_empty());
    assert!(!outer.path().join("out.log").exists());
}

#[tokio::test]
async fn test_failed_upload_aborts_submission() {
    let submit_dir = tempfile::tempdir().unwrap();
    let cluster_dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(submit_dir.path().join("inputs")).unwrap();
    fs::write(submit_dir.path().join("inputs/a.txt"), "a").unwrap();

    let client = Arc::new(LocalClusterClient::new(cluster_dir.path()));
    client.connect().await.unwrap();
    let registry = Arc::new(TransferRegistry::new());

    // Escaping the cluster root is refused before anything is uploaded.
    let result = stage_submission(
        client.clone(),
        registry.clone(),
        submit_dir.path(),
        "../elsewhere",
        &descriptor(&[]),
    )
    .await;
    assert!(result.is_err());
    assert!(registry.snapshot().is_empty());
}
