pub mod conflict;
pub mod leave;
pub mod rota;
pub mod shift;
pub mod stats;
pub mod week;
