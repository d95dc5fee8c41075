mod now_playing;
mod player;

pub use now_playing::NowPlaying;
pub use player::{PlayOutcome, PlayRequest, Player, PlayerState};
