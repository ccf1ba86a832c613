use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use astra_model::{ComponentId, ServiceType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub id: ComponentId,
    pub location: String,
    pub service: ServiceType,
    pub host: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}
