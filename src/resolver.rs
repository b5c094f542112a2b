//! Facility resolution: map a canonical facility onto exactly one row.
//!
//! Identity is the exact triple `(jurisdiction, normalized name,
//! normalized address)`. No fuzzy matching happens here.
//!
//! Creation is optimistic and lock-free. Two runs can both miss the lookup
//! and both try to insert the same new facility; the loser sees
//! [`FacilityInsert::IdentityConflict`] and re-reads the winner's row. A
//! collision on slug alone is retried once with a random suffix.

use anyhow::{bail, Result};
use tracing::{debug, warn};

use poolwatch_core::models::{
    CanonicalFacility, Facility, FacilityInsert, FacilityKey, Jurisdiction, NewFacility,
};
use poolwatch_core::normalizers::{
    format_display_address, format_display_name, normalize_address, normalize_facility_name,
    AddressParts,
};
use poolwatch_core::slug::{base_slug, numbered_slug, randomized_slug};
use poolwatch_core::store::Store;

/// Numbered candidates tried before falling back to a random suffix.
const MAX_NUMBERED_SLUGS: u32 = 1000;

pub fn facility_key(jurisdiction_id: &str, facility: &CanonicalFacility) -> FacilityKey {
    FacilityKey {
        jurisdiction_id: jurisdiction_id.to_string(),
        normalized_name: normalize_facility_name(&facility.raw_name),
        normalized_address: normalize_address(&facility.raw_address),
    }
}

/// Find the facility for `facility` in `jurisdiction`, creating it if needed.
pub async fn resolve_facility(
    store: &dyn Store,
    jurisdiction: &Jurisdiction,
    facility: &CanonicalFacility,
) -> Result<Facility> {
    let key = facility_key(&jurisdiction.id, facility);

    if let Some(existing) = store.find_facility(&key).await? {
        return backfill(store, existing, facility).await;
    }

    let base = base_slug(&facility.raw_name, &jurisdiction.slug);
    let mut new = new_facility(key, unique_slug(store, &base).await?, facility);

    match store.insert_facility(&new).await? {
        FacilityInsert::Created(f) => {
            debug!(facility_id = %f.id, slug = %f.slug, "Created facility");
            return Ok(f);
        }
        FacilityInsert::IdentityConflict => return reread(store, &new.key).await,
        FacilityInsert::SlugConflict => {
            warn!(slug = %new.slug, "Slug taken concurrently, retrying with random suffix");
        }
    }

    new.slug = randomized_slug(&base);
    match store.insert_facility(&new).await? {
        FacilityInsert::Created(f) => Ok(f),
        FacilityInsert::IdentityConflict => reread(store, &new.key).await,
        FacilityInsert::SlugConflict => bail!("Could not allocate a slug for '{}'", base),
    }
}

async fn reread(store: &dyn Store, key: &FacilityKey) -> Result<Facility> {
    match store.find_facility(key).await? {
        Some(f) => Ok(f),
        None => bail!(
            "Facility '{}' at '{}' conflicted on insert but cannot be found",
            key.normalized_name,
            key.normalized_address
        ),
    }
}

/// Fill coordinates the stored row is missing.
async fn backfill(
    store: &dyn Store,
    mut existing: Facility,
    facility: &CanonicalFacility,
) -> Result<Facility> {
    let lat = existing.latitude.is_none().then_some(facility.latitude).flatten();
    let lon = existing.longitude.is_none().then_some(facility.longitude).flatten();
    if lat.is_some() || lon.is_some() {
        store.backfill_coordinates(&existing.id, lat, lon).await?;
        existing.latitude = existing.latitude.or(lat);
        existing.longitude = existing.longitude.or(lon);
    }
    Ok(existing)
}

/// First of `base`, `base-1`, `base-2`, ... not already taken.
async fn unique_slug(store: &dyn Store, base: &str) -> Result<String> {
    for n in 0..MAX_NUMBERED_SLUGS {
        let candidate = numbered_slug(base, n);
        if !store.slug_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    Ok(randomized_slug(base))
}

fn new_facility(key: FacilityKey, slug: String, facility: &CanonicalFacility) -> NewFacility {
    let display_address = format_display_address(AddressParts {
        address: &facility.raw_address,
        city: facility.raw_city.as_deref(),
        state: facility.raw_state.as_deref(),
        zip: facility.raw_zip.as_deref(),
    });
    NewFacility {
        key,
        slug,
        external_id: facility.external_id.clone(),
        raw_name: facility.raw_name.clone(),
        raw_address: facility.raw_address.clone(),
        display_name: format_display_name(&facility.raw_name),
        display_address,
        city: facility
            .raw_city
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        state: facility.raw_state.clone().unwrap_or_else(|| "TX".to_string()),
        zip_code: facility.raw_zip.clone(),
        latitude: facility.latitude,
        longitude: facility.longitude,
    }
}
