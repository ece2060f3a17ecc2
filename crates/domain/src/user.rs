use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 外部身份系统拥有的用户，核心只读取不修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub is_active: bool,
}

impl User {
    pub fn new(id: UserId, display_name: impl Into<String>, is_active: bool) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_active,
        }
    }
}
