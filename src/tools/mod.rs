// Static tools the agent endpoint can dispatch to
//
// No model involvement here: a fixed keyword-to-songs lookup the agent
// invokes when the model decides the user wants recommendations.

use serde::Serialize;

/// Result of the static song lookup.
#[derive(Debug, Serialize, PartialEq)]
pub struct MoodSongs {
    pub mood: String,
    pub songs: Vec<String>,
}

/// Look up canned songs for a mood keyword. Unknown moods fall back to a
/// single default pick rather than failing.
pub fn recommend_songs(mood: &str) -> MoodSongs {
    let songs: Vec<&str> = match mood {
        "romantic" => vec!["Perfect - Ed Sheeran", "Raabta - Arijit Singh", "Tum Hi Ho"],
        "sad" => vec!["Fix You - Coldplay", "Let Her Go - Passenger"],
        "happy" => vec!["Happy - Pharrell Williams", "Can't Stop the Feeling"],
        _ => vec!["Believer - Imagine Dragons"],
    };

    MoodSongs {
        mood: mood.to_string(),
        songs: songs.into_iter().map(String::from).collect(),
    }
}
