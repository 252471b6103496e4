//! Role entity

use crate::{Permissions, Snowflake};
use serde::{Deserialize, Serialize};

/// A guild role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: Snowflake,
    pub name: String,
    pub color: u32,
    pub hoist: bool,
    pub position: u32,
    pub permissions: Permissions,
    pub managed: bool,
    pub mentionable: bool,
}
