use astra_core::{ComponentStatus, ContainerStatus};
use astra_model::{ComponentId, ComponentKind, LifecycleState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentView {
    pub id: ComponentId,
    pub kind: ComponentKind,
    pub state: LifecycleState,
    pub running: bool,
}

impl From<ComponentStatus> for ComponentView {
    fn from(status: ComponentStatus) -> Self {
        Self {
            running: status.state.is_running(),
            id: status.id,
            kind: status.kind,
            state: status.state,
        }
    }
}

/// Serializable snapshot of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerView {
    pub name: String,
    pub components: Vec<ComponentView>,
}

impl From<ContainerStatus> for ContainerView {
    fn from(status: ContainerStatus) -> Self {
        Self {
            name: status.name,
            components: status.components.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_camel_case_snapshot() {
        let status = ContainerStatus {
            name: "tcs".into(),
            components: vec![
                ComponentStatus {
                    id: ComponentId::new("tcs", "mount"),
                    kind: ComponentKind::Hcd,
                    state: LifecycleState::RunningOffline,
                },
                ComponentStatus {
                    id: ComponentId::new("tcs", "assembly"),
                    kind: ComponentKind::Assembly,
                    state: LifecycleState::Error("encoder fault".into()),
                },
            ],
        };

        let view = ContainerView::from(status);
        assert!(view.components[0].running);
        assert!(!view.components[1].running);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["name"], "tcs");
        assert_eq!(json["components"][0]["id"], "tcs.mount");
        assert_eq!(json["components"][0]["running"], true);
    }
}
