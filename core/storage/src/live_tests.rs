//! Scenario tests against real platforms.
//!
//! Ignored by default. Run with `--ignored` after exporting credentials:
//! - AWS: `POLYCLOUD_AWS_ACCESS_KEY`, `POLYCLOUD_AWS_SECRET_KEY`, `POLYCLOUD_AWS_ENDPOINT`
//! - Azure: `POLYCLOUD_AZURE_ACCOUNT`, `POLYCLOUD_AZURE_KEY`
//! - GCP: `POLYCLOUD_GCP_JSON`, `POLYCLOUD_GCP_PROJECT`

use std::env;
use tempfile::TempDir;
use uuid::Uuid;

use crate::account::StorageAccount;

const TEST_CONTENT: &str = "This is a test.";

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

async fn run_scenario(mut account: StorageAccount) {
    let platform = account.platform();
    let storage = account.storage_mut().expect("account has storage");
    storage.set_handle_errors(false);

    let dir = TempDir::new().unwrap();
    let upload = dir.path().join("test.txt");
    std::fs::write(&upload, TEST_CONTENT).unwrap();
    let folder = format!("test-{}", Uuid::new_v4());

    assert!(storage.open().await.unwrap(), "{platform} open");
    assert!(storage.new_folder(&folder).await.unwrap());
    assert!(storage.upload_file_to(&folder, &upload).await.unwrap());

    let output = dir.path().join("test2.txt");
    assert!(storage.download_file_from(&folder, "test.txt", &output).await.unwrap());
    let downloaded = std::fs::read_to_string(dir.path().join("test.txt")).unwrap();
    assert_eq!(downloaded, TEST_CONTENT);

    assert!(storage.delete_file(&folder, "test.txt").await.unwrap());
    assert!(storage.delete_folder(&folder).await.unwrap());
    assert!(storage.close().await.unwrap());
}

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn test_aws_scenario() {
    let (Some(access), Some(secret)) = (var("POLYCLOUD_AWS_ACCESS_KEY"), var("POLYCLOUD_AWS_SECRET_KEY")) else {
        eprintln!("AWS credentials not set; skipping");
        return;
    };
    let endpoint = var("POLYCLOUD_AWS_ENDPOINT").unwrap_or_else(|| "us-east-1".to_string());
    run_scenario(StorageAccount::aws(&access, &secret, &endpoint)).await;
}

#[tokio::test]
#[ignore = "requires Azure credentials"]
async fn test_azure_scenario() {
    let (Some(name), Some(key)) = (var("POLYCLOUD_AZURE_ACCOUNT"), var("POLYCLOUD_AZURE_KEY")) else {
        eprintln!("Azure credentials not set; skipping");
        return;
    };
    run_scenario(StorageAccount::azure(&name, &key)).await;
}

#[tokio::test]
#[ignore = "requires GCP credentials"]
async fn test_gcp_scenario() {
    let (Some(json), Some(project)) = (var("POLYCLOUD_GCP_JSON"), var("POLYCLOUD_GCP_PROJECT")) else {
        eprintln!("GCP credentials not set; skipping");
        return;
    };
    run_scenario(StorageAccount::gcp(&json, &project)).await;
}

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn test_aws_invalid_credentials() {
    let mut account = StorageAccount::aws("AKIAINVALIDKEY000000", "invalid", "us-east-1");
    let storage = account.storage_mut().expect("account has storage");

    assert!(!storage.open().await.unwrap());
    assert!(matches!(
        storage.last_error(),
        Some(polycloud_common::Error::Authentication(_))
    ));
}
