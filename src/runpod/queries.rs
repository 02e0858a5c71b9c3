//! GraphQL documents sent to the RunPod API.
//!
//! String operands are rendered as JSON string literals, which GraphQL
//! accepts verbatim, so ids and environment values cannot break out of the
//! document.

use serde_json::Value;

use crate::backend::InstanceRequest;

const POD_FIELDS: &str = "id name desiredStatus costPerHr \
     machine { gpuDisplayName podHostId } \
     runtime { ports { ip isIpPublic privatePort publicPort type } }";

fn literal(value: &str) -> String {
    Value::String(value.to_owned()).to_string()
}

pub(crate) fn list_pods() -> String {
    format!("query Pods {{ myself {{ pods {{ {POD_FIELDS} }} }} }}")
}

pub(crate) fn get_pod(id: &str) -> String {
    format!(
        "query Pod {{ pod(input: {{ podId: {} }}) {{ {POD_FIELDS} }} }}",
        literal(id)
    )
}

pub(crate) fn deploy_pod(request: &InstanceRequest) -> String {
    let env = request
        .env
        .iter()
        .map(|(key, value)| format!("{{ key: {}, value: {} }}", literal(key), literal(value)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "mutation Deploy {{ podFindAndDeployOnDemand(input: {{ \
         cloudType: {tier}, gpuCount: {gpus}, volumeInGb: {volume}, \
         containerDiskInGb: {disk}, minVcpuCount: 2, minMemoryInGb: {memory}, \
         gpuTypeId: {gpu}, name: {name}, imageName: {image}, ports: {ports}, \
         volumeMountPath: {mount}, env: [{env}] }}) {{ {POD_FIELDS} }} }}",
        tier = request.cloud_tier.as_str(),
        gpus = request.gpu_count,
        volume = request.volume_gb,
        disk = request.container_disk_gb,
        memory = request.min_memory_gb,
        gpu = literal(&request.gpu_type_id),
        name = literal(&request.name),
        image = literal(&request.image_name),
        ports = literal(&request.ports_spec()),
        mount = literal(&request.volume_mount_path),
    )
}

pub(crate) fn terminate_pod(id: &str) -> String {
    format!(
        "mutation Terminate {{ podTerminate(input: {{ podId: {} }}) }}",
        literal(id)
    )
}
