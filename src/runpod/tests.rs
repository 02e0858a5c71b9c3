//! Unit tests for GraphQL rendering and response decoding.

use reqwest::StatusCode;
use rstest::rstest;

use super::types::{DeployData, MyselfData, PodData};
use super::{RunPodBackend, RunPodBackendError, decode_response, queries};
use crate::backend::{CloudTier, DesiredStatus, InstanceRecord, InstanceRequest};
use crate::config::ProviderConfig;

const LIST_BODY: &str = r#"{
  "data": {
    "myself": {
      "pods": [
        {
          "id": "abc123",
          "name": "ltx2-comfyui-prod",
          "desiredStatus": "RUNNING",
          "costPerHr": 0.79,
          "machine": { "gpuDisplayName": "RTX A6000", "podHostId": "abc123-host" },
          "runtime": {
            "ports": [
              { "ip": "100.65.0.2", "isIpPublic": false, "privatePort": 8888, "publicPort": 8888, "type": "http" },
              { "ip": "194.68.245.9", "isIpPublic": true, "privatePort": 22, "publicPort": 22081, "type": "tcp" }
            ]
          }
        },
        {
          "id": "def456",
          "name": "ltx2-comfyui-value",
          "desiredStatus": "CREATED",
          "costPerHr": 0.39,
          "machine": null,
          "runtime": null
        }
      ]
    }
  }
}"#;

fn provider_config(api_key: &str) -> ProviderConfig {
    ProviderConfig {
        api_key: api_key.to_owned(),
        api_url: String::from("https://api.runpod.io/graphql"),
        request_timeout_secs: 30,
    }
}

#[rstest]
fn decodes_pod_list_into_records() {
    let data: MyselfData =
        decode_response("list pods", StatusCode::OK, LIST_BODY).expect("body should decode");

    let records: Vec<InstanceRecord> = data
        .myself
        .pods
        .into_iter()
        .map(InstanceRecord::from)
        .collect();

    let running = records.first().expect("first pod");
    assert_eq!(running.desired_status, DesiredStatus::Running);
    assert_eq!(running.machine.gpu_name, "RTX A6000");
    assert!(running.is_usable());
    let ssh = running.control_mapping().expect("public ssh mapping");
    assert_eq!(ssh.public_port, 22081);

    let pending = records.get(1).expect("second pod");
    assert_eq!(pending.desired_status, DesiredStatus::Pending);
    assert!(pending.runtime.is_none());
    assert!(!pending.is_usable());
}

#[rstest]
fn surfaces_graphql_errors() {
    let body = r#"{"data":null,"errors":[{"message":"There are no longer any instances available with the requested specifications."}]}"#;

    let err = decode_response::<DeployData>("create pod", StatusCode::OK, body)
        .expect_err("errors array should fail");

    assert_eq!(
        err,
        RunPodBackendError::Api {
            operation: String::from("create pod"),
            message: String::from(
                "There are no longer any instances available with the requested specifications."
            ),
        }
    );
}

#[rstest]
fn reports_http_status_for_non_json_failures() {
    let err = decode_response::<PodData>("get pod", StatusCode::UNAUTHORIZED, "Unauthorized")
        .expect_err("401 should fail");

    assert!(matches!(err, RunPodBackendError::Status { status: 401, .. }));
}

#[rstest]
fn missing_data_is_a_decode_error() {
    let err = decode_response::<PodData>("get pod", StatusCode::OK, "{}")
        .expect_err("no data should fail");

    assert!(matches!(err, RunPodBackendError::Decode { .. }));
}

#[rstest]
fn null_pod_decodes_as_absent() {
    let data: PodData = decode_response("get pod", StatusCode::OK, r#"{"data":{"pod":null}}"#)
        .expect("null pod is valid data");

    assert!(data.pod.is_none());
}

#[rstest]
fn deploy_document_escapes_operands() {
    let request = InstanceRequest::builder()
        .name("pod \"quoted\"")
        .image_name("runpod/pytorch:latest")
        .gpu_type_id("NVIDIA A40")
        .cloud_tier(CloudTier::Community)
        .min_memory_gb(48)
        .container_disk_gb(40)
        .volume_gb(150)
        .ports(["8888/http", "22/tcp"])
        .volume_mount_path("/workspace")
        .env("HF_TOKEN", "hf_abc")
        .build()
        .expect("valid request");

    let document = queries::deploy_pod(&request);

    assert!(document.contains("cloudType: COMMUNITY"));
    assert!(document.contains(r#"name: "pod \"quoted\"""#));
    assert!(document.contains(r#"ports: "8888/http,22/tcp""#));
    assert!(document.contains(r#"{ key: "HF_TOKEN", value: "hf_abc" }"#));
    assert!(document.contains("volumeInGb: 150"));
    assert!(document.contains("desiredStatus"));
}

#[rstest]
fn deploy_document_selects_hardware_by_gpu_type_only() {
    let request = InstanceRequest::builder()
        .name("ltx2-comfyui-prod")
        .image_name("runpod/pytorch:latest")
        .gpu_type_id("NVIDIA RTX A6000")
        .cloud_tier(CloudTier::Secure)
        .min_vram_gb(48)
        .min_memory_gb(32)
        .container_disk_gb(40)
        .volume_gb(150)
        .ports(["22/tcp"])
        .volume_mount_path("/workspace")
        .build()
        .expect("valid request");

    let document = queries::deploy_pod(&request);

    assert!(document.contains(r#"gpuTypeId: "NVIDIA RTX A6000""#));
    assert!(document.contains("minMemoryInGb: 32"));
    assert!(!document.to_lowercase().contains("vram"), "{document}");
}

#[rstest]
fn pod_queries_quote_ids() {
    assert!(queries::get_pod("abc123").contains(r#"podId: "abc123""#));
    assert!(queries::terminate_pod("abc123").contains(r#"podTerminate(input: { podId: "abc123" })"#));
    assert!(queries::list_pods().starts_with("query Pods { myself { pods {"));
}

#[rstest]
#[case::empty("")]
#[case::blank("   ")]
fn backend_requires_api_key(#[case] key: &str) {
    let err = RunPodBackend::new(provider_config(key)).expect_err("missing key should fail");

    let RunPodBackendError::Config(message) = err else {
        panic!("expected config error, got {err:?}");
    };
    assert!(message.contains("RUNPOD_API_KEY"), "message: {message}");
}
