mod support;

#[path = "e2e/lifecycle.rs"]
mod lifecycle;

#[path = "e2e/retirement_cascade.rs"]
mod retirement_cascade;

#[path = "e2e/store_migration.rs"]
mod store_migration;

#[path = "property/eligibility.rs"]
mod eligibility;

#[path = "concurrency/override_consume.rs"]
mod override_consume;

#[path = "concurrency/breaker_race.rs"]
mod breaker_race;
