//! Sample story fixture.
//!
//! Small enough to reason about in a test, but covering every chapter type:
//! a two-way opening, a single-continue chapter, a minigame, an audio-focus
//! chapter with long text, a chapter that auto-advances via `nextChapter`,
//! and two endings that offer a restart.

/// The sample story as JSON, keyed by chapter id.
pub const SAMPLE_STORY_JSON: &str = r#"{
  "start": {
    "id": "start",
    "title": "A Sunny Windowsill",
    "text": "Whiskers wakes on the windowsill. Bubbles drift past the glass.",
    "type": "story",
    "choices": [
      {
        "text": "Follow the glowing bubbles",
        "nextChapter": "bubble_garden",
        "effects": { "location": "Garden Path" }
      },
      { "text": "Curl up for another nap", "nextChapter": "nap_ending" }
    ]
  },
  "bubble_garden": {
    "id": "bubble_garden",
    "title": "The Bubble Garden",
    "text": "The bubbles lead to a hidden garden where every flower hums.",
    "type": "story",
    "effects": { "location": "Bubble Garden" },
    "choices": [
      {
        "text": "Touch the biggest bubble",
        "nextChapter": "bubble_trial",
        "effects": { "hasBubblePowers": true }
      }
    ]
  },
  "bubble_trial": {
    "id": "bubble_trial",
    "title": "Bubble Trial",
    "text": "Pop the bubbles before they float away!",
    "type": "minigame",
    "minigameId": "bubble_pop",
    "choices": [{ "text": "Continue", "nextChapter": "ally_meeting" }]
  },
  "ally_meeting": {
    "id": "ally_meeting",
    "title": "A Squirrel Appears",
    "text": "A small squirrel with a bent tail hops out from behind the humming tulips. It looks at Whiskers, then at the shimmering bubble still clinging to Whiskers' fur, then back at Whiskers. The squirrel chatters a long story about a tower at the edge of the garden where all the bubbles are born, and about a grumpy crow who has been stealing them one by one. The squirrel cannot reach the tower alone. The path is long and winds past the pond, over the old stone wall and under the rose bushes where the thorns are sharp. Whiskers' ears twitch. The sun is warm, the garden hums, and somewhere far away a crow caws. The squirrel waits, tail flicking, for an answer.",
    "type": "audio_focus",
    "choices": [
      {
        "text": "Team up with the squirrel",
        "nextChapter": "hero_ending",
        "effects": { "hasAlly": true, "courage": "Brave" }
      },
      { "text": "Go it alone", "nextChapter": "lonely_path" }
    ]
  },
  "lonely_path": {
    "id": "lonely_path",
    "title": "The Long Way Round",
    "text": "Whiskers sets off alone and gets scratched by the rose bushes.",
    "type": "story",
    "effects": { "health": 80 },
    "choices": [],
    "nextChapter": "hero_ending"
  },
  "hero_ending": {
    "id": "hero_ending",
    "title": "Keeper of the Bubbles",
    "text": "The crow returns every bubble, and the garden sings.",
    "type": "ending",
    "endingType": "hero",
    "choices": [{ "text": "Play again", "nextChapter": "start" }]
  },
  "nap_ending": {
    "id": "nap_ending",
    "title": "The Coziest Nap",
    "text": "Whiskers dreams of bubbles and never leaves the windowsill.",
    "type": "ending",
    "endingType": "cozy",
    "choices": [{ "text": "Play again", "nextChapter": "start" }]
  }
}"#;
