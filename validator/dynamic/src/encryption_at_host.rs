use crate::{cancellable, Result, Validator};
use admission_validator_core::{
    cluster::{Cluster, FeatureState},
    resources::{ResourceSku, ENCRYPTION_AT_HOST_CAPABILITY, VIRTUAL_MACHINES},
    CloudError,
};
use ahash::AHashMap as HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A VM size that must support encryption at host.
struct Profile {
    vm_size: String,
    path: String,
}

fn profiles(oc: &Cluster) -> Vec<Profile> {
    let mut profiles = Vec::new();
    let master = &oc.properties.master_profile;
    if master.encryption_at_host == FeatureState::Enabled {
        profiles.push(Profile {
            vm_size: master.vm_size.clone(),
            path: "properties.masterProfile".to_string(),
        });
    }

    let (workers, property) = oc.worker_profiles();
    for (i, wp) in workers.iter().enumerate() {
        if wp.encryption_at_host == FeatureState::Enabled {
            profiles.push(Profile {
                vm_size: wp.vm_size.clone(),
                path: format!("properties.{property}[{i}]"),
            });
        }
    }
    profiles
}

pub(crate) async fn validate(v: &Validator, cancel: &CancellationToken, oc: &Cluster) -> Result<()> {
    let profiles = profiles(oc);
    if profiles.is_empty() {
        return Ok(());
    }

    let filter = format!("location eq {}", oc.location);
    let skus = cancellable(cancel, v.clients.resource_skus.list(&filter)).await??;
    let skus = skus
        .iter()
        .filter(|sku| sku.resource_type == VIRTUAL_MACHINES)
        .map(|sku| (sku.name.as_str(), sku))
        .collect::<HashMap<_, _>>();

    for profile in &profiles {
        debug!(vm_size = %profile.vm_size, "Validating encryption at host support");
        let sku = available_sku(&skus, &oc.location, profile)?;
        let supported = sku
            .capability(ENCRYPTION_AT_HOST_CAPABILITY)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));
        if !supported {
            return Err(CloudError::invalid_parameter(
                format!("{}.encryptionAtHost", profile.path),
                format!(
                    "VM SKU '{}' does not support encryption at host.",
                    profile.vm_size
                ),
            )
            .into());
        }
    }
    Ok(())
}

fn available_sku<'s>(
    skus: &HashMap<&str, &'s ResourceSku>,
    location: &str,
    profile: &Profile,
) -> Result<&'s ResourceSku> {
    match skus.get(profile.vm_size.as_str()) {
        Some(sku) if sku.is_available_in(location) => Ok(*sku),
        _ => Err(CloudError::invalid_parameter(
            format!("{}.vmSize", profile.path),
            format!(
                "The selected SKU '{}' is unavailable in region '{location}'",
                profile.vm_size
            ),
        )
        .into()),
    }
}
