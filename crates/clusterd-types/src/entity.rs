use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The closed taxonomy of uniformly addressable resources.
///
/// Adding a kind means adding a variant here and a parse/format arm in
/// [`EntityRef`]; there is no open extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Server,
    Project,
    Instance,
    InstanceSnapshot,
    InstanceBackup,
    Image,
    ImageAlias,
    Profile,
    Network,
    NetworkAcl,
    NetworkZone,
    StoragePool,
    StorageVolume,
    StorageVolumeSnapshot,
    StorageVolumeBackup,
    StorageBucket,
    ClusterMember,
    ClusterGroup,
    Operation,
    Warning,
    Certificate,
    Identity,
    AuthGroup,
    IdentityProviderGroup,
}

impl EntityType {
    /// Entities that live under a project scope rather than server-wide.
    pub fn is_project_scoped(self) -> bool {
        matches!(
            self,
            EntityType::Instance
                | EntityType::InstanceSnapshot
                | EntityType::InstanceBackup
                | EntityType::Image
                | EntityType::ImageAlias
                | EntityType::Profile
                | EntityType::Network
                | EntityType::NetworkAcl
                | EntityType::NetworkZone
                | EntityType::StorageVolume
                | EntityType::StorageVolumeSnapshot
                | EntityType::StorageVolumeBackup
                | EntityType::StorageBucket
                | EntityType::Operation
                | EntityType::Warning
        )
    }

    /// Entities that always live on exactly one member and whose owner
    /// must be resolved before the router can dispatch locally.
    pub fn is_member_scoped(self) -> bool {
        matches!(
            self,
            EntityType::Instance
                | EntityType::InstanceSnapshot
                | EntityType::InstanceBackup
                | EntityType::StorageVolume
                | EntityType::StorageVolumeSnapshot
                | EntityType::StorageVolumeBackup
                | EntityType::Operation
        )
    }
}

/// An error produced when a URL does not parse to a known entity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse entity reference from {0:?}")]
pub struct ParseEntityRefError(pub String);

/// The tuple `(type, project, location, path-args…)` that uniquely
/// identifies an API resource, independent of how it was addressed.
///
/// `format(parse(u)) == canonical(u)` for every `u` the router accepts;
/// `project` is always `None` for server-scoped kinds and `location`
/// (the `target` query parameter) is a router concern layered on top,
/// not part of the path itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityType,
    pub project: Option<String>,
    pub path: Vec<String>,
}

impl EntityRef {
    pub fn new(kind: EntityType, path: Vec<String>) -> Self {
        Self {
            kind,
            project: None,
            path,
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Parses the path component of a `/1.0/...` URL (the query string,
    /// including `project`/`target`/`recursion`, is stripped by the
    /// caller and fed back via [`EntityRef::with_project`]).
    pub fn parse(path: &str) -> Result<EntityRef, ParseEntityRefError> {
        let path = path.strip_prefix("/1.0").unwrap_or(path);
        let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let err = || ParseEntityRefError(path.to_string());

        if segs.is_empty() {
            return Ok(EntityRef::new(EntityType::Server, vec![]));
        }

        let owned = |s: &[&str]| s.iter().map(|x| x.to_string()).collect::<Vec<_>>();

        match segs[0] {
            "projects" if segs.len() == 2 => Ok(EntityRef::new(EntityType::Project, owned(&segs[1..]))),
            "instances" => match segs.len() {
                2 => Ok(EntityRef::new(EntityType::Instance, owned(&segs[1..]))),
                4 if segs[2] == "snapshots" => {
                    Ok(EntityRef::new(EntityType::InstanceSnapshot, owned(&[segs[1], segs[3]])))
                }
                4 if segs[2] == "backups" => {
                    Ok(EntityRef::new(EntityType::InstanceBackup, owned(&[segs[1], segs[3]])))
                }
                _ => Err(err()),
            },
            "images" => match segs.as_slice() {
                [_, fp] => Ok(EntityRef::new(EntityType::Image, owned(&[fp]))),
                [_, "aliases", name] => Ok(EntityRef::new(EntityType::ImageAlias, owned(&[name]))),
                _ => Err(err()),
            },
            "profiles" if segs.len() == 2 => Ok(EntityRef::new(EntityType::Profile, owned(&segs[1..]))),
            "networks" if segs.len() == 2 => Ok(EntityRef::new(EntityType::Network, owned(&segs[1..]))),
            "network-acls" if segs.len() == 2 => {
                Ok(EntityRef::new(EntityType::NetworkAcl, owned(&segs[1..])))
            }
            "network-zones" => match segs.len() {
                2 => Ok(EntityRef::new(EntityType::NetworkZone, owned(&segs[1..]))),
                4 if segs[2] == "records" => {
                    Ok(EntityRef::new(EntityType::NetworkZone, owned(&[segs[1], "records", segs[3]])))
                }
                _ => Err(err()),
            },
            "storage-pools" => match segs.len() {
                2 => Ok(EntityRef::new(EntityType::StoragePool, owned(&segs[1..]))),
                5 if segs[2] == "volumes" => {
                    Ok(EntityRef::new(EntityType::StorageVolume, owned(&[segs[1], segs[3], segs[4]])))
                }
                7 if segs[2] == "volumes" && segs[5] == "snapshots" => Ok(EntityRef::new(
                    EntityType::StorageVolumeSnapshot,
                    owned(&[segs[1], segs[3], segs[4], segs[6]]),
                )),
                7 if segs[2] == "volumes" && segs[5] == "backups" => Ok(EntityRef::new(
                    EntityType::StorageVolumeBackup,
                    owned(&[segs[1], segs[3], segs[4], segs[6]]),
                )),
                4 if segs[2] == "buckets" => {
                    Ok(EntityRef::new(EntityType::StorageBucket, owned(&[segs[1], segs[3]])))
                }
                _ => Err(err()),
            },
            "cluster" => match segs.as_slice() {
                [_, "members", name] => Ok(EntityRef::new(EntityType::ClusterMember, owned(&[name]))),
                [_, "groups", name] => Ok(EntityRef::new(EntityType::ClusterGroup, owned(&[name]))),
                _ => Err(err()),
            },
            "operations" if segs.len() == 2 => Ok(EntityRef::new(EntityType::Operation, owned(&segs[1..]))),
            "warnings" if segs.len() == 2 => Ok(EntityRef::new(EntityType::Warning, owned(&segs[1..]))),
            "certificates" if segs.len() == 2 => {
                Ok(EntityRef::new(EntityType::Certificate, owned(&segs[1..])))
            }
            "auth" => match segs.as_slice() {
                [_, "identities", method, id] => {
                    Ok(EntityRef::new(EntityType::Identity, owned(&[method, id])))
                }
                [_, "groups", name] => Ok(EntityRef::new(EntityType::AuthGroup, owned(&[name]))),
                [_, "identity-provider-groups", name] => {
                    Ok(EntityRef::new(EntityType::IdentityProviderGroup, owned(&[name])))
                }
                _ => Err(err()),
            },
            _ => Err(err()),
        }
    }

    /// Re-emits the canonical `/1.0/...` URL for this reference (without
    /// the `project`/`target` query parameters, which the router adds).
    pub fn format(&self) -> String {
        let p = &self.path;
        let joined = |segs: &[String]| segs.join("/");
        match self.kind {
            EntityType::Server => "/1.0".to_string(),
            EntityType::Project => format!("/1.0/projects/{}", joined(p)),
            EntityType::Instance => format!("/1.0/instances/{}", joined(p)),
            EntityType::InstanceSnapshot => {
                format!("/1.0/instances/{}/snapshots/{}", p[0], p[1])
            }
            EntityType::InstanceBackup => format!("/1.0/instances/{}/backups/{}", p[0], p[1]),
            EntityType::Image => format!("/1.0/images/{}", joined(p)),
            EntityType::ImageAlias => format!("/1.0/images/aliases/{}", joined(p)),
            EntityType::Profile => format!("/1.0/profiles/{}", joined(p)),
            EntityType::Network => format!("/1.0/networks/{}", joined(p)),
            EntityType::NetworkAcl => format!("/1.0/network-acls/{}", joined(p)),
            EntityType::NetworkZone if p.len() == 3 => {
                format!("/1.0/network-zones/{}/records/{}", p[0], p[2])
            }
            EntityType::NetworkZone => format!("/1.0/network-zones/{}", joined(p)),
            EntityType::StoragePool => format!("/1.0/storage-pools/{}", joined(p)),
            EntityType::StorageVolume => {
                format!("/1.0/storage-pools/{}/volumes/{}/{}", p[0], p[1], p[2])
            }
            EntityType::StorageVolumeSnapshot => format!(
                "/1.0/storage-pools/{}/volumes/{}/{}/snapshots/{}",
                p[0], p[1], p[2], p[3]
            ),
            EntityType::StorageVolumeBackup => format!(
                "/1.0/storage-pools/{}/volumes/{}/{}/backups/{}",
                p[0], p[1], p[2], p[3]
            ),
            EntityType::StorageBucket => {
                format!("/1.0/storage-pools/{}/buckets/{}", p[0], p[1])
            }
            EntityType::ClusterMember => format!("/1.0/cluster/members/{}", joined(p)),
            EntityType::ClusterGroup => format!("/1.0/cluster/groups/{}", joined(p)),
            EntityType::Operation => format!("/1.0/operations/{}", joined(p)),
            EntityType::Warning => format!("/1.0/warnings/{}", joined(p)),
            EntityType::Certificate => format!("/1.0/certificates/{}", joined(p)),
            EntityType::Identity => format!("/1.0/auth/identities/{}/{}", p[0], p[1]),
            EntityType::AuthGroup => format!("/1.0/auth/groups/{}", joined(p)),
            EntityType::IdentityProviderGroup => {
                format!("/1.0/auth/identity-provider-groups/{}", joined(p))
            }
        }
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bijection_holds_for_every_canonical_url() {
        let urls = [
            "/1.0",
            "/1.0/projects/default",
            "/1.0/instances/web1",
            "/1.0/instances/web1/snapshots/s0",
            "/1.0/instances/web1/backups/b0",
            "/1.0/images/abcd1234",
            "/1.0/images/aliases/bionic",
            "/1.0/profiles/default",
            "/1.0/networks/lxdbr0",
            "/1.0/network-acls/web",
            "/1.0/network-zones/example.com",
            "/1.0/network-zones/example.com/records/www",
            "/1.0/storage-pools/default",
            "/1.0/storage-pools/default/volumes/custom/data",
            "/1.0/storage-pools/default/volumes/custom/data/snapshots/s0",
            "/1.0/storage-pools/default/volumes/custom/data/backups/b0",
            "/1.0/storage-pools/default/buckets/assets",
            "/1.0/cluster/members/node1",
            "/1.0/cluster/groups/default",
            "/1.0/operations/11111111-1111-1111-1111-111111111111",
            "/1.0/warnings/22222222-2222-2222-2222-222222222222",
            "/1.0/auth/identities/tls/abcd",
            "/1.0/auth/groups/admins",
            "/1.0/auth/identity-provider-groups/eng",
            "/1.0/certificates/abcd1234",
        ];
        for url in urls {
            let parsed = EntityRef::parse(url).unwrap_or_else(|e| panic!("{url}: {e}"));
            assert_eq!(parsed.format(), url, "round-trip mismatch for {url}");
        }
    }

    #[test]
    fn unknown_url_is_rejected() {
        assert!(EntityRef::parse("/1.0/not-a-real-kind/foo").is_err());
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_paths_never_panic_the_parser(path in "[a-z0-9/._-]{0,60}") {
            if let Ok(parsed) = EntityRef::parse(&path) {
                // Whatever parses must re-parse from its canonical form.
                let canonical = parsed.format();
                proptest::prop_assert_eq!(EntityRef::parse(&canonical).unwrap(), parsed);
            }
        }
    }
}
