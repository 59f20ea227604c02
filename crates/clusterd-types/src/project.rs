use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Per-project feature toggles.
///
/// When a feature is disabled, entities of the corresponding kind
/// created "in" this project are actually resolved against `default`
/// (see the router's project-resolution step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFeatures {
    pub images: bool,
    pub profiles: bool,
    pub storage_volumes: bool,
    pub networks: bool,
}

impl Default for ProjectFeatures {
    fn default() -> Self {
        Self {
            images: true,
            profiles: true,
            storage_volumes: true,
            networks: true,
        }
    }
}

/// A named scope that owns entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub features: ProjectFeatures,
}

impl Project {
    pub const DEFAULT: &'static str = "default";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: ProjectFeatures::default(),
        }
    }

    pub fn default_project() -> Self {
        Self::new(Self::DEFAULT)
    }

    pub fn is_default(&self) -> bool {
        self.name == Self::DEFAULT
    }
}

impl Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
