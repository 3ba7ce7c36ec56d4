use serde::{Deserialize, Serialize};

/// One entry of `GET /v1/models`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelObject {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelObject>,
}

impl ModelList {
    pub fn new(models: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            object: "list".to_string(),
            data: models
                .into_iter()
                .map(|(id, owned_by)| ModelObject {
                    id,
                    object: "model".to_string(),
                    created: 0,
                    owned_by,
                })
                .collect(),
        }
    }
}
