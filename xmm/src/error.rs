use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("venue error: {0}")]
    Venue(#[from] venues::VenueError),
}
