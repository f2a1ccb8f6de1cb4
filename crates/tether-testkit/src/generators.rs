//! Record-set generators.

use tether_core::{records_from, RecordIdentity, Records};

use crate::fixtures::{moon, planet};

/// A populated solar-system record map with both sides of every
/// relationship filled in: jupiter/io/europa and saturn/titan.
pub fn solar_system_records() -> Records {
    let jupiter = planet("jupiter", "Jupiter").with_has_many(
        "moons",
        [
            RecordIdentity::new("moon", "io"),
            RecordIdentity::new("moon", "europa"),
        ],
    );
    let saturn = planet("saturn", "Saturn")
        .with_has_many("moons", [RecordIdentity::new("moon", "titan")]);

    let io = moon("io", "Io").with_has_one("planet", Some(RecordIdentity::new("planet", "jupiter")));
    let europa = moon("europa", "Europa")
        .with_has_one("planet", Some(RecordIdentity::new("planet", "jupiter")));
    let titan = moon("titan", "Titan")
        .with_has_one("planet", Some(RecordIdentity::new("planet", "saturn")));

    records_from([jupiter, saturn, io, europa, titan])
}

/// A planet with `count` linked moons, both sides consistent.
pub fn linked_planet_system(planet_id: &str, count: usize) -> Records {
    let moon_ids: Vec<RecordIdentity> = (0..count)
        .map(|i| RecordIdentity::new("moon", format!("{planet_id}-m{i}")))
        .collect();

    let mut records = vec![planet(planet_id, planet_id).with_has_many("moons", moon_ids.clone())];
    for identity in moon_ids {
        records.push(
            moon(&identity.id, &identity.id)
                .with_has_one("planet", Some(RecordIdentity::new("planet", planet_id))),
        );
    }
    records_from(records)
}
