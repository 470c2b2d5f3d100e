use serde::{Deserialize, Serialize};

/// Verified caller context supplied by the authentication middleware that
/// sits in front of the CORE. Every call into storage carries one of these;
/// a tenant-less call is a programming error, not a recoverable one — see
/// `amc_storage::Store`'s panic-on-empty-tenant guard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: String,
    pub actor: ActorRef,
    pub roles: Vec<String>,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, actor: ActorRef) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor,
            roles: Vec::new(),
        }
    }

    pub fn is_owner_of(&self, tenant_id: &str) -> bool {
        self.tenant_id == tenant_id
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Human,
    Agent,
    Tool,
}

impl ActorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Agent => "agent",
            Self::Tool => "tool",
        }
    }
}

impl std::str::FromStr for ActorType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "human" => Ok(Self::Human),
            "agent" => Ok(Self::Agent),
            "tool" => Ok(Self::Tool),
            other => Err(format!("unknown actor type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorRef {
    pub actor_type: ActorType,
    pub id: String,
}

impl ActorRef {
    pub fn new(actor_type: ActorType, id: impl Into<String>) -> Self {
        Self {
            actor_type,
            id: id.into(),
        }
    }

    pub fn human(id: impl Into<String>) -> Self {
        Self::new(ActorType::Human, id)
    }

    pub fn agent(id: impl Into<String>) -> Self {
        Self::new(ActorType::Agent, id)
    }

    pub fn tool(id: impl Into<String>) -> Self {
        Self::new(ActorType::Tool, id)
    }
}
