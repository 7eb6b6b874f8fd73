pub mod absences;
pub mod config;
pub mod conflict_detector;
pub mod context;
pub mod events;
pub mod notification;
pub mod optimistic;
pub mod rota_api;
pub mod rota_fetcher;
pub mod rota_lifecycle;
pub mod shift_grid;
pub mod week_stats;

#[cfg(test)]
pub(crate) mod testing;
