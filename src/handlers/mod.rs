pub mod agents;
pub mod missions;
pub mod reputation;


#[cfg(test)]
mod missions_http_tests;

pub use agents::configure_agent_routes;
pub use missions::configure_mission_routes;
pub use reputation::configure_reputation_routes;
