//! Wire shapes of the RunPod GraphQL API and their mapping to backend records.

use serde::{Deserialize, Serialize};

use crate::backend::{DesiredStatus, InstanceRecord, MachineInfo, PortMapping, RuntimeInfo};

#[derive(Debug, Serialize)]
pub(crate) struct GraphQlRequest<'a> {
    pub(crate) query: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub(crate) data: Option<T>,
    #[serde(default)]
    pub(crate) errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub(crate) message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PodWire {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) desired_status: Option<String>,
    #[serde(default)]
    pub(crate) cost_per_hr: Option<f64>,
    #[serde(default)]
    pub(crate) machine: Option<MachineWire>,
    #[serde(default)]
    pub(crate) runtime: Option<RuntimeWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MachineWire {
    #[serde(default)]
    pub(crate) gpu_display_name: Option<String>,
    #[serde(default)]
    pub(crate) pod_host_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RuntimeWire {
    #[serde(default)]
    pub(crate) ports: Option<Vec<PortWire>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PortWire {
    #[serde(default)]
    pub(crate) ip: Option<String>,
    #[serde(default)]
    pub(crate) is_ip_public: Option<bool>,
    #[serde(default)]
    pub(crate) private_port: Option<u16>,
    #[serde(default)]
    pub(crate) public_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MyselfData {
    pub(crate) myself: MyselfWire,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MyselfWire {
    #[serde(default)]
    pub(crate) pods: Vec<PodWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PodData {
    pub(crate) pod: Option<PodWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeployData {
    pub(crate) pod_find_and_deploy_on_demand: Option<PodWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TerminateData {
    #[serde(default)]
    pub(crate) pod_terminate: Option<serde_json::Value>,
}

impl PortWire {
    /// Mappings without both port numbers are dropped.
    fn into_mapping(self) -> Option<PortMapping> {
        Some(PortMapping {
            private_port: self.private_port?,
            public_port: self.public_port?,
            ip: self.ip.filter(|ip| !ip.trim().is_empty()),
            is_public: self.is_ip_public.unwrap_or(false),
        })
    }
}

impl From<PodWire> for InstanceRecord {
    fn from(value: PodWire) -> Self {
        let machine = value.machine.map_or_else(MachineInfo::default, |machine| MachineInfo {
            gpu_name: machine.gpu_display_name.unwrap_or_default(),
            host_id: machine.pod_host_id,
        });
        let runtime = value.runtime.map(|runtime| RuntimeInfo {
            ports: runtime
                .ports
                .unwrap_or_default()
                .into_iter()
                .filter_map(PortWire::into_mapping)
                .collect(),
        });
        Self {
            id: value.id,
            name: value.name.unwrap_or_default(),
            desired_status: value
                .desired_status
                .as_deref()
                .map_or(DesiredStatus::Pending, DesiredStatus::from_provider),
            machine,
            runtime,
            cost_per_hour: value.cost_per_hr.unwrap_or_default(),
        }
    }
}
