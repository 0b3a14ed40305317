use crate::{cancellable, errors::LinkedResource, Result, Validator};
use admission_validator_core::{cluster::Cluster, CloudError, ErrorCode, ResourceId};
use ahash::AHashSet as HashSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DES_ACTIONS: &[&str] = &["Microsoft.Compute/diskEncryptionSets/read"];

/// Disk encryption sets referenced by the control plane and worker pools,
/// each with the first document path referencing it.
fn disk_encryption_sets(oc: &Cluster) -> Vec<(&str, String)> {
    let mut refs = Vec::new();
    if let Some(id) = oc.properties.master_profile.disk_encryption_set_id.as_deref() {
        refs.push((id, "properties.masterProfile.diskEncryptionSetId".to_string()));
    }

    let (workers, property) = oc.worker_profiles();
    for (i, wp) in workers.iter().enumerate() {
        if let Some(id) = wp.disk_encryption_set_id.as_deref() {
            refs.push((id, format!("properties.{property}[{i}].diskEncryptionSetId")));
        }
    }

    let mut seen = HashSet::new();
    refs.retain(|(id, _)| !id.is_empty() && seen.insert(id.to_lowercase()));
    refs
}

pub(crate) async fn validate(v: &Validator, cancel: &CancellationToken, oc: &Cluster) -> Result<()> {
    for (id, path) in disk_encryption_sets(oc) {
        debug!(%id, "Validating disk encryption set");
        v.validate_linked(cancel, LinkedResource::DiskEncryptionSet, id, &path, DES_ACTIONS)
            .await?;

        let resource = id.parse::<ResourceId>()?;
        let des = cancellable(
            cancel,
            v.clients
                .disk_encryption_sets
                .get(resource.resource_group(), resource.name()),
        )
        .await?;
        let des = match des {
            Ok(des) => des,
            Err(e) if e.is_not_found() => {
                return Err(LinkedResource::DiskEncryptionSet.not_found(id, &path).into())
            }
            Err(e) => return Err(e.into()),
        };

        if !des.location.eq_ignore_ascii_case(&oc.location) {
            return Err(CloudError::structural(
                ErrorCode::InvalidLinkedDiskEncryptionSet,
                "",
                format!(
                    "The disk encryption set location '{}' must match the cluster location '{}'.",
                    des.location, oc.location
                ),
            )
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use admission_validator_core::cluster::WorkerProfile;

    const DES1: &str = "/subscriptions/0000/resourceGroups/rg/providers/Microsoft.Compute/diskEncryptionSets/des1";
    const DES2: &str = "/subscriptions/0000/resourceGroups/rg/providers/Microsoft.Compute/diskEncryptionSets/des2";

    #[test]
    fn collects_unique_sets_with_first_path() {
        let mut oc = Cluster::default();
        oc.properties.master_profile.disk_encryption_set_id = Some(DES1.to_string());
        oc.properties.worker_profiles_status = vec![
            WorkerProfile {
                disk_encryption_set_id: Some(DES1.to_uppercase()),
                ..Default::default()
            },
            WorkerProfile {
                disk_encryption_set_id: Some(DES2.to_string()),
                ..Default::default()
            },
        ];

        assert_eq!(
            disk_encryption_sets(&oc),
            vec![
                (DES1, "properties.masterProfile.diskEncryptionSetId".to_string()),
                (DES2, "properties.workerProfilesStatus[1].diskEncryptionSetId".to_string()),
            ]
        );
    }

    #[test]
    fn no_sets() {
        assert!(disk_encryption_sets(&Cluster::default()).is_empty());
    }
}
