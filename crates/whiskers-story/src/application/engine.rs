//! The chapter state machine.
//!
//! The engine owns the story book and the state-machine position; the game
//! state is lent to it for every operation. Nothing is published or played
//! directly: operations queue [`EngineOutput`]s (notifications and
//! side-channel requests) that the caller drains with
//! [`StoryEngine::take_outputs`] and carries out in order.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use whiskers_core::clock::{Clock, iso_timestamp};
use whiskers_core::error::ContentError;
use whiskers_core::features::FeatureToggles;
use whiskers_core::signal::{AudioStatus, MinigameEvent, MinigameResult, SideChannelSignal, TaskId};

use crate::domain::chapter::{Chapter, ChapterType, Choice, START_CHAPTER, StoryBook};
use crate::domain::notifications::{ChoiceSummary, InputContext, Notification};
use crate::domain::state::{ChapterVisit, ChoiceRecord, GameState, MinigameRecord};

/// Position of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryPhase {
    /// No chapter loaded yet.
    Idle,
    /// Waiting for one of several choices.
    AwaitingChoice,
    /// Waiting for a continue signal.
    AwaitingProceed,
    /// A minigame is running.
    MinigameActive,
    /// Narration of an audio-focus chapter is playing. Input is accepted.
    AudioPlaying,
    /// An ending is shown.
    Ended,
    /// The chapter has no way forward.
    Stalled,
}

/// Work the engine asks a side channel to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideChannelRequest {
    /// Play the narration for a chapter.
    PlayAudio { task: TaskId, chapter_id: String },
    /// Stop whatever is playing.
    StopAudio,
    /// Load and run a minigame.
    LoadMinigame { task: TaskId, minigame_id: String },
    /// Tear down the running minigame.
    UnloadMinigame,
}

/// Something the caller must carry out after an engine operation.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    /// Publish a notification.
    Notify(Notification),
    /// Forward a request to a side channel.
    SideChannel(SideChannelRequest),
}

/// Progress summary for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub current_chapter: String,
    pub chapters_completed: usize,
    pub choices_made: usize,
    pub game_ended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    Audio,
    Minigame,
}

#[derive(Debug, Clone, Copy)]
struct PendingTask {
    id: TaskId,
    kind: TaskKind,
}

/// The story state machine.
#[derive(Debug)]
pub struct StoryEngine {
    book: Arc<StoryBook>,
    features: FeatureToggles,
    current: Option<Chapter>,
    phase: StoryPhase,
    pending: Option<PendingTask>,
    next_task: u64,
    generation: u64,
    outbox: Vec<EngineOutput>,
}

impl StoryEngine {
    /// Creates an idle engine over a validated story.
    #[must_use]
    pub fn new(book: Arc<StoryBook>, features: FeatureToggles) -> Self {
        Self {
            book,
            features,
            current: None,
            phase: StoryPhase::Idle,
            pending: None,
            next_task: 0,
            generation: 0,
            outbox: Vec::new(),
        }
    }

    /// Drains the queued outputs in the order they were produced.
    pub fn take_outputs(&mut self) -> Vec<EngineOutput> {
        std::mem::take(&mut self.outbox)
    }

    fn notify(&mut self, notification: Notification) {
        self.outbox.push(EngineOutput::Notify(notification));
    }

    /// Resets the game state and loads the start chapter.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::ChapterNotFound` if the story has no start
    /// chapter, which a validated story never lacks.
    pub fn start_story(
        &mut self,
        state: &mut GameState,
        clock: &dyn Clock,
    ) -> Result<(), ContentError> {
        info!("starting story from the beginning");
        self.cancel_side_channels(state);
        state.reset();
        self.current = None;
        self.phase = StoryPhase::Idle;
        self.load_chapter(START_CHAPTER, state, clock)
    }

    /// Loads a chapter and runs its type-specific flow.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::ChapterNotFound` if `id` is not in the story;
    /// the game state is left untouched in that case.
    pub fn load_chapter(
        &mut self,
        id: &str,
        state: &mut GameState,
        clock: &dyn Clock,
    ) -> Result<(), ContentError> {
        let chapter = self
            .book
            .chapter(id)
            .cloned()
            .ok_or_else(|| ContentError::ChapterNotFound(id.to_owned()))?;
        info!(chapter = %id, kind = chapter.kind.as_str(), "loading chapter");

        self.cancel_side_channels(state);
        self.generation += 1;

        state.current_chapter = chapter.id.clone();
        state.story_progress.chapters_completed.push(ChapterVisit {
            id: chapter.id.clone(),
            timestamp: iso_timestamp(clock.now()),
        });
        state.game_status.current_choice_index = 0;
        state.game_status.is_waiting_for_input = false;
        state.game_status.game_ended = chapter.kind == ChapterType::Ending;
        if let Some(effects) = &chapter.effects {
            let touched = state.player_stats.apply(effects);
            debug!(chapter = %id, ?touched, "applied chapter effects");
        }
        self.current = Some(chapter.clone());

        if !chapter.choices.is_empty() {
            self.notify(Notification::ChoicesAvailable {
                chapter: chapter.id.clone(),
                choices: summarize(&chapter.choices),
                current_selection: 0,
            });
        }
        self.notify(Notification::ChapterChanged {
            current_chapter: chapter.id.clone(),
            chapter_title: chapter.title.clone(),
            chapter_type: chapter.kind,
            has_choices: !chapter.choices.is_empty(),
            player_state: state.player_stats.clone(),
        });

        match chapter.kind {
            ChapterType::Story => {
                self.play_chapter_audio(&chapter);
                self.enter_waiting(&chapter, state);
                Ok(())
            }
            ChapterType::Ending => {
                self.enter_ending(&chapter, state);
                Ok(())
            }
            ChapterType::Minigame => self.enter_minigame(&chapter, state, clock),
            ChapterType::AudioFocus => {
                let playing = self.play_chapter_audio(&chapter);
                self.enter_waiting(&chapter, state);
                if playing && self.phase != StoryPhase::Stalled {
                    self.phase = StoryPhase::AudioPlaying;
                }
                Ok(())
            }
        }
    }

    fn play_chapter_audio(&mut self, chapter: &Chapter) -> bool {
        if !self.features.audio {
            return false;
        }
        let task = self.start_task(TaskKind::Audio);
        self.outbox
            .push(EngineOutput::SideChannel(SideChannelRequest::PlayAudio {
                task,
                chapter_id: chapter.id.clone(),
            }));
        true
    }

    fn enter_waiting(&mut self, chapter: &Chapter, state: &mut GameState) {
        let phase = settled_phase(chapter);
        self.phase = phase;
        match phase {
            StoryPhase::AwaitingChoice => {
                state.game_status.is_waiting_for_input = true;
                self.notify(Notification::ready_for_input(
                    InputContext::Choices,
                    chapter.choices.len(),
                ));
            }
            StoryPhase::AwaitingProceed => {
                state.game_status.is_waiting_for_input = true;
                self.notify(Notification::ready_for_input(
                    InputContext::Story,
                    chapter.choices.len(),
                ));
            }
            _ => {
                state.game_status.is_waiting_for_input = false;
                warn!(chapter = %chapter.id, "chapter has no choices and no next chapter");
            }
        }
    }

    fn enter_ending(&mut self, chapter: &Chapter, state: &mut GameState) {
        info!(chapter = %chapter.id, ending = ?chapter.ending_type, "reached an ending");
        self.phase = StoryPhase::Ended;
        state.game_status.game_ended = true;
        state.game_status.is_waiting_for_input = !chapter.choices.is_empty();
        self.play_chapter_audio(chapter);
        self.notify(Notification::GameEnded {
            ending_type: chapter.ending_type.clone(),
            ending_title: chapter.title.clone(),
            player_stats: state.player_stats.clone(),
            choices_made: state.story_progress.choices_made.len(),
        });
    }

    fn enter_minigame(
        &mut self,
        chapter: &Chapter,
        state: &mut GameState,
        clock: &dyn Clock,
    ) -> Result<(), ContentError> {
        if !self.features.minigames {
            info!(chapter = %chapter.id, "minigames disabled, skipping to next chapter");
            return self.resume_after_minigame(chapter, state, clock);
        }
        let minigame_id = chapter.resolved_minigame_id();
        let task = self.start_task(TaskKind::Minigame);
        info!(chapter = %chapter.id, minigame = %minigame_id, %task, "starting minigame");
        self.phase = StoryPhase::MinigameActive;
        state.game_status.minigame_active = true;
        self.outbox
            .push(EngineOutput::SideChannel(SideChannelRequest::LoadMinigame {
                task,
                minigame_id,
            }));
        Ok(())
    }

    /// Takes the choice at `index` on the current chapter.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::InvalidChoiceIndex` if there is no current
    /// chapter or `index` is out of range (state untouched), and
    /// `ContentError::ChapterNotFound` if the choice leads to a missing
    /// chapter.
    pub fn make_choice(
        &mut self,
        index: usize,
        state: &mut GameState,
        clock: &dyn Clock,
    ) -> Result<(), ContentError> {
        let chapter = self.current.clone().ok_or(ContentError::InvalidChoiceIndex {
            index: as_signed(index),
            available: 0,
        })?;
        let choice = chapter
            .choices
            .get(index)
            .ok_or(ContentError::InvalidChoiceIndex {
                index: as_signed(index),
                available: chapter.choices.len(),
            })?;
        info!(chapter = %chapter.id, index, text = %choice.text, "choice made");

        state.story_progress.choices_made.push(ChoiceRecord {
            chapter: chapter.id.clone(),
            choice_index: index,
            choice_text: choice.text.clone(),
            timestamp: iso_timestamp(clock.now()),
        });
        self.notify(Notification::ChoiceMade {
            chapter: chapter.id.clone(),
            choice_index: index,
            choice_text: choice.text.clone(),
            next_chapter: choice.next_chapter.clone(),
        });
        self.take_choice(&chapter, index, state, clock)
    }

    fn take_choice(
        &mut self,
        chapter: &Chapter,
        index: usize,
        state: &mut GameState,
        clock: &dyn Clock,
    ) -> Result<(), ContentError> {
        let choice = chapter
            .choices
            .get(index)
            .ok_or(ContentError::InvalidChoiceIndex {
                index: as_signed(index),
                available: chapter.choices.len(),
            })?;
        if let Some(effects) = &choice.effects {
            let touched = state.player_stats.apply(effects);
            debug!(chapter = %chapter.id, ?touched, "applied choice effects");
        }
        state.game_status.is_waiting_for_input = false;

        let Some(next) = choice.next_chapter.clone() else {
            warn!(chapter = %chapter.id, index, "choice has no next chapter");
            self.phase = StoryPhase::Stalled;
            return Ok(());
        };
        state.story_progress.path_taken.clone_from(&next);

        if chapter.kind == ChapterType::Ending && next == START_CHAPTER {
            info!(ending = ?chapter.ending_type, "restarting adventure from ending");
            self.cancel_side_channels(state);
            state.reset();
            self.notify(Notification::AdventureRestarted {
                previous_ending: chapter.ending_type.clone(),
            });
        }
        self.load_chapter(&next, state, clock)
    }

    /// Continues past a chapter that offers at most one way forward.
    ///
    /// Does nothing (with a log line) when a real decision is pending, a
    /// minigame is running, or there is nowhere to go.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::ChapterNotFound` if the continuation leads to a
    /// missing chapter.
    pub fn proceed_to_next(
        &mut self,
        state: &mut GameState,
        clock: &dyn Clock,
    ) -> Result<(), ContentError> {
        let Some(chapter) = self.current.clone() else {
            info!("no chapter loaded, nothing to proceed from");
            return Ok(());
        };
        if chapter.has_real_choices() {
            info!(chapter = %chapter.id, "cannot proceed, a choice must be made");
            return Ok(());
        }
        if self.phase == StoryPhase::MinigameActive {
            info!(chapter = %chapter.id, "cannot proceed while a minigame is running");
            return Ok(());
        }
        if chapter.choices.len() == 1 {
            return self.take_choice(&chapter, 0, state, clock);
        }
        if let Some(next) = &chapter.next_chapter {
            state.game_status.is_waiting_for_input = false;
            state.story_progress.path_taken.clone_from(next);
            return self.load_chapter(next, state, clock);
        }
        info!(chapter = %chapter.id, "no next chapter available for auto-progression");
        Ok(())
    }

    /// Loads any chapter directly. Only honoured in development mode; returns
    /// whether the jump happened.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::ChapterNotFound` if `id` is not in the story.
    pub fn jump_to_chapter(
        &mut self,
        id: &str,
        state: &mut GameState,
        clock: &dyn Clock,
    ) -> Result<bool, ContentError> {
        if !self.features.development_mode {
            warn!(chapter = %id, "chapter jumping is only available in development mode");
            return Ok(false);
        }
        info!(chapter = %id, "jumping to chapter");
        self.load_chapter(id, state, clock)?;
        Ok(true)
    }

    /// Feeds a side-channel report into the state machine. Reports for a task
    /// other than the one in flight are ignored.
    ///
    /// # Errors
    ///
    /// Returns a `ContentError` if resuming after a minigame fails to load the
    /// next chapter.
    pub fn apply_signal(
        &mut self,
        signal: SideChannelSignal,
        state: &mut GameState,
        clock: &dyn Clock,
    ) -> Result<(), ContentError> {
        if !self.is_current_task(signal.task()) {
            debug!(task = %signal.task(), "ignoring signal from a superseded task");
            return Ok(());
        }
        match signal {
            SideChannelSignal::Audio { file, status, .. } => {
                state.game_status.audio_playing = status.is_playing();
                self.notify(Notification::AudioStatus {
                    status,
                    audio_file: file,
                });
                if status == AudioStatus::Finished {
                    self.pending = None;
                    if self.phase == StoryPhase::AudioPlaying {
                        if let Some(chapter) = &self.current {
                            self.phase = settled_phase(chapter);
                        }
                    }
                }
                Ok(())
            }
            SideChannelSignal::Minigame {
                task,
                minigame_id,
                event,
            } => {
                self.notify(Notification::MinigameStatus {
                    status: event.status(),
                    minigame_id: minigame_id.clone(),
                    result: event.payload(),
                });
                match event {
                    MinigameEvent::Started => {
                        state.game_status.minigame_active = true;
                        Ok(())
                    }
                    MinigameEvent::Progress(_) => Ok(()),
                    MinigameEvent::Completed(result) => {
                        self.continue_after_minigame(task, &minigame_id, &result, state, clock)
                    }
                    MinigameEvent::Failed(result) => {
                        self.handle_minigame_failure(task, &minigame_id, &result, state, clock)
                    }
                    MinigameEvent::Error(message) => {
                        warn!(minigame = %minigame_id, error = %message, "minigame error, placeholder takes over");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Records a won minigame and resumes the story.
    ///
    /// # Errors
    ///
    /// Returns a `ContentError` if the continuation leads to a missing
    /// chapter.
    pub fn continue_after_minigame(
        &mut self,
        task: TaskId,
        minigame_id: &str,
        result: &MinigameResult,
        state: &mut GameState,
        clock: &dyn Clock,
    ) -> Result<(), ContentError> {
        self.finish_minigame(task, minigame_id, true, result, state, clock)
    }

    /// Records a lost minigame and resumes the story along the same edge a
    /// win would take.
    ///
    /// # Errors
    ///
    /// Returns a `ContentError` if the continuation leads to a missing
    /// chapter.
    pub fn handle_minigame_failure(
        &mut self,
        task: TaskId,
        minigame_id: &str,
        result: &MinigameResult,
        state: &mut GameState,
        clock: &dyn Clock,
    ) -> Result<(), ContentError> {
        self.finish_minigame(task, minigame_id, false, result, state, clock)
    }

    fn finish_minigame(
        &mut self,
        task: TaskId,
        minigame_id: &str,
        success: bool,
        result: &MinigameResult,
        state: &mut GameState,
        clock: &dyn Clock,
    ) -> Result<(), ContentError> {
        if !self.is_current_task(task) {
            debug!(%task, "ignoring completion of a superseded minigame");
            return Ok(());
        }
        info!(minigame = %minigame_id, success, score = ?result.score, "minigame finished");
        self.pending = None;
        state.game_status.minigame_active = false;
        state.minigame_results.push(MinigameRecord {
            minigame_id: minigame_id.to_owned(),
            success,
            score: result.score,
            completion_time: result.completion_time,
            timestamp: iso_timestamp(clock.now()),
        });
        match self.current.clone() {
            Some(chapter) => self.resume_after_minigame(&chapter, state, clock),
            None => Ok(()),
        }
    }

    fn resume_after_minigame(
        &mut self,
        chapter: &Chapter,
        state: &mut GameState,
        clock: &dyn Clock,
    ) -> Result<(), ContentError> {
        if !chapter.choices.is_empty() {
            return self.take_choice(chapter, 0, state, clock);
        }
        if let Some(next) = &chapter.next_chapter {
            state.story_progress.path_taken.clone_from(next);
            return self.load_chapter(next, state, clock);
        }
        warn!(chapter = %chapter.id, "no way forward after minigame");
        self.phase = StoryPhase::Stalled;
        state.game_status.is_waiting_for_input = false;
        Ok(())
    }

    /// Cancels the side-channel task in flight, if any.
    pub fn cancel_side_channels(&mut self, state: &mut GameState) {
        let Some(task) = self.pending.take() else {
            return;
        };
        debug!(task = %task.id, kind = ?task.kind, "cancelling side channel");
        let request = match task.kind {
            TaskKind::Audio => {
                state.game_status.audio_playing = false;
                SideChannelRequest::StopAudio
            }
            TaskKind::Minigame => {
                state.game_status.minigame_active = false;
                SideChannelRequest::UnloadMinigame
            }
        };
        self.outbox.push(EngineOutput::SideChannel(request));
    }

    fn start_task(&mut self, kind: TaskKind) -> TaskId {
        if let Some(previous) = self.pending.take() {
            let request = match previous.kind {
                TaskKind::Audio => SideChannelRequest::StopAudio,
                TaskKind::Minigame => SideChannelRequest::UnloadMinigame,
            };
            self.outbox.push(EngineOutput::SideChannel(request));
        }
        self.next_task += 1;
        let id = TaskId(self.next_task);
        self.pending = Some(PendingTask { id, kind });
        id
    }

    fn is_current_task(&self, task: TaskId) -> bool {
        self.pending.is_some_and(|p| p.id == task)
    }

    /// Current state-machine position.
    #[must_use]
    pub fn phase(&self) -> StoryPhase {
        self.phase
    }

    /// The loaded chapter.
    #[must_use]
    pub fn current_chapter(&self) -> Option<&Chapter> {
        self.current.as_ref()
    }

    /// Choices of the loaded chapter.
    #[must_use]
    pub fn choices(&self) -> &[Choice] {
        self.current.as_ref().map_or(&[], |c| c.choices.as_slice())
    }

    /// Bumped on every successful chapter load.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The side-channel task in flight.
    #[must_use]
    pub fn pending_task(&self) -> Option<TaskId> {
        self.pending.map(|p| p.id)
    }

    /// Feature switches the engine runs with.
    #[must_use]
    pub fn features(&self) -> FeatureToggles {
        self.features
    }

    /// The story being played.
    #[must_use]
    pub fn book(&self) -> &StoryBook {
        &self.book
    }

    /// Every chapter id in the story.
    #[must_use]
    pub fn available_chapters(&self) -> Vec<&str> {
        self.book.chapter_ids()
    }

    /// Distinct chapter types in the story.
    #[must_use]
    pub fn chapter_types(&self) -> BTreeSet<ChapterType> {
        self.book.chapter_types()
    }

    /// Whether `from` links directly to `to`.
    #[must_use]
    pub fn validate_chapter_link(&self, from: &str, to: &str) -> bool {
        self.book.links_to(from, to)
    }

    /// Progress summary of the current playthrough.
    #[must_use]
    pub fn progress(&self, state: &GameState) -> ProgressSummary {
        ProgressSummary {
            current_chapter: state.current_chapter.clone(),
            chapters_completed: state.story_progress.chapters_completed.len(),
            choices_made: state.story_progress.choices_made.len(),
            game_ended: state.game_status.game_ended,
        }
    }
}

fn settled_phase(chapter: &Chapter) -> StoryPhase {
    if chapter.has_real_choices() {
        StoryPhase::AwaitingChoice
    } else if !chapter.choices.is_empty() || chapter.next_chapter.is_some() {
        StoryPhase::AwaitingProceed
    } else {
        StoryPhase::Stalled
    }
}

fn summarize(choices: &[Choice]) -> Vec<ChoiceSummary> {
    choices
        .iter()
        .enumerate()
        .map(|(index, choice)| ChoiceSummary {
            index,
            text: choice.text.clone(),
        })
        .collect()
}

fn as_signed(index: usize) -> i64 {
    i64::try_from(index).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use whiskers_test_support::{FixedClock, SAMPLE_STORY_JSON, fixed_clock};

    fn features(audio: bool, minigames: bool) -> FeatureToggles {
        FeatureToggles {
            mqtt: true,
            audio,
            minigames,
            development_mode: true,
        }
    }

    fn setup(features: FeatureToggles) -> (StoryEngine, GameState, FixedClock) {
        let book = Arc::new(StoryBook::from_json(SAMPLE_STORY_JSON).unwrap());
        (
            StoryEngine::new(book, features),
            GameState::new(true),
            fixed_clock(),
        )
    }

    fn started(features: FeatureToggles) -> (StoryEngine, GameState, FixedClock) {
        let (mut engine, mut state, clock) = setup(features);
        engine.start_story(&mut state, &clock).unwrap();
        engine.take_outputs();
        (engine, state, clock)
    }

    fn notification_types(outputs: &[EngineOutput]) -> Vec<&'static str> {
        outputs
            .iter()
            .filter_map(|o| match o {
                EngineOutput::Notify(n) => Some(n.message_type()),
                EngineOutput::SideChannel(_) => None,
            })
            .collect()
    }

    fn minigame_task(outputs: &[EngineOutput]) -> TaskId {
        outputs
            .iter()
            .find_map(|o| match o {
                EngineOutput::SideChannel(SideChannelRequest::LoadMinigame { task, .. }) => {
                    Some(*task)
                }
                _ => None,
            })
            .expect("expected a LoadMinigame request")
    }

    fn result(success: bool) -> MinigameResult {
        MinigameResult {
            success,
            score: Some(300),
            completion_time: Some(12_000),
        }
    }

    #[test]
    fn test_load_chapter_with_two_choices_awaits_choice() {
        // Arrange
        let (mut engine, mut state, clock) = setup(features(false, true));

        // Act
        engine.load_chapter("start", &mut state, &clock).unwrap();

        // Assert
        assert_eq!(state.current_chapter, "start");
        assert!(state.game_status.is_waiting_for_input);
        assert_eq!(engine.phase(), StoryPhase::AwaitingChoice);
        let outputs = engine.take_outputs();
        assert_eq!(
            notification_types(&outputs),
            vec!["choices_available", "chapter_changed", "ready_for_input"]
        );
        match outputs.last() {
            Some(EngineOutput::Notify(Notification::ReadyForInput {
                context,
                available_choices,
                ..
            })) => {
                assert_eq!(*context, InputContext::Choices);
                assert_eq!(*available_choices, Some(2));
            }
            other => panic!("expected ReadyForInput, got {other:?}"),
        }
    }

    #[test]
    fn test_load_chapter_with_single_choice_awaits_proceed() {
        let (mut engine, mut state, clock) = setup(features(false, true));

        engine.load_chapter("bubble_garden", &mut state, &clock).unwrap();

        assert!(state.game_status.is_waiting_for_input);
        assert_eq!(engine.phase(), StoryPhase::AwaitingProceed);
        let outputs = engine.take_outputs();
        match outputs.last() {
            Some(EngineOutput::Notify(Notification::ReadyForInput { context, .. })) => {
                assert_eq!(*context, InputContext::Story);
            }
            other => panic!("expected ReadyForInput, got {other:?}"),
        }
    }

    #[test]
    fn test_load_chapter_without_choices_follows_next_chapter() {
        let (mut engine, mut state, clock) = setup(features(false, true));

        engine.load_chapter("lonely_path", &mut state, &clock).unwrap();

        assert!(state.game_status.is_waiting_for_input);
        assert_eq!(engine.phase(), StoryPhase::AwaitingProceed);
        assert_eq!(state.player_stats.health, 80);
    }

    #[test]
    fn test_chapter_without_way_forward_stalls() {
        let json = r#"{"start": {"id": "start", "title": "t", "text": "x"}}"#;
        let book = Arc::new(StoryBook::from_json(json).unwrap());
        let mut engine = StoryEngine::new(book, features(false, true));
        let mut state = GameState::new(true);

        engine.load_chapter("start", &mut state, &fixed_clock()).unwrap();

        assert_eq!(engine.phase(), StoryPhase::Stalled);
        assert!(!state.game_status.is_waiting_for_input);
    }

    #[test]
    fn test_load_unknown_chapter_leaves_state_untouched() {
        // Arrange
        let (mut engine, mut state, clock) = started(features(false, true));
        let before = state.clone();

        // Act
        let result = engine.load_chapter("nowhere", &mut state, &clock);

        // Assert
        assert_eq!(
            result,
            Err(ContentError::ChapterNotFound("nowhere".to_owned()))
        );
        assert_eq!(state, before);
        assert!(engine.take_outputs().is_empty());
    }

    #[test]
    fn test_load_chapter_records_visit_and_applies_effects() {
        let (mut engine, mut state, clock) = setup(features(false, true));

        engine.load_chapter("bubble_garden", &mut state, &clock).unwrap();

        assert_eq!(state.player_stats.location, "Bubble Garden");
        assert_eq!(state.story_progress.chapters_completed.len(), 1);
        assert_eq!(
            state.story_progress.chapters_completed[0].timestamp,
            "2026-01-15T10:00:00.000Z"
        );
    }

    #[test]
    fn test_make_choice_out_of_range_never_mutates_state() {
        // Arrange
        let (mut engine, mut state, clock) = started(features(false, true));
        let before = state.clone();

        // Act
        let result = engine.make_choice(5, &mut state, &clock);

        // Assert
        assert_eq!(
            result,
            Err(ContentError::InvalidChoiceIndex {
                index: 5,
                available: 2
            })
        );
        assert_eq!(state, before);
        assert_eq!(engine.current_chapter().unwrap().id, "start");
        assert!(engine.take_outputs().is_empty());
    }

    #[test]
    fn test_make_choice_without_chapter_is_invalid() {
        let (mut engine, mut state, clock) = setup(features(false, true));

        let result = engine.make_choice(0, &mut state, &clock);

        assert_eq!(
            result,
            Err(ContentError::InvalidChoiceIndex {
                index: 0,
                available: 0
            })
        );
    }

    #[test]
    fn test_make_choice_records_applies_effects_and_loads_target() {
        // Arrange
        let (mut engine, mut state, clock) = started(features(false, true));

        // Act
        engine.make_choice(0, &mut state, &clock).unwrap();

        // Assert
        assert_eq!(state.current_chapter, "bubble_garden");
        assert_eq!(state.story_progress.path_taken, "bubble_garden");
        let record = &state.story_progress.choices_made[0];
        assert_eq!(record.chapter, "start");
        assert_eq!(record.choice_index, 0);
        assert_eq!(record.choice_text, "Follow the glowing bubbles");
        // chapter effects of bubble_garden overwrite the choice's location
        assert_eq!(state.player_stats.location, "Bubble Garden");
        let types = notification_types(&engine.take_outputs());
        assert_eq!(types[0], "choice_made");
        assert!(types.contains(&"chapter_changed"));
    }

    #[test]
    fn test_proceed_refuses_when_real_choices_exist() {
        let (mut engine, mut state, clock) = started(features(false, true));

        engine.proceed_to_next(&mut state, &clock).unwrap();

        assert_eq!(state.current_chapter, "start");
        assert!(engine.take_outputs().is_empty());
    }

    #[test]
    fn test_proceed_takes_single_choice_without_recording() {
        let (mut engine, mut state, clock) = setup(features(false, false));
        engine.load_chapter("bubble_garden", &mut state, &clock).unwrap();

        engine.proceed_to_next(&mut state, &clock).unwrap();

        // minigames disabled: bubble_trial is skipped straight to ally_meeting
        assert_eq!(state.current_chapter, "ally_meeting");
        assert!(state.player_stats.has_bubble_powers);
        assert!(state.story_progress.choices_made.is_empty());
    }

    #[test]
    fn test_proceed_follows_next_chapter() {
        let (mut engine, mut state, clock) = setup(features(false, true));
        engine.load_chapter("lonely_path", &mut state, &clock).unwrap();

        engine.proceed_to_next(&mut state, &clock).unwrap();

        assert_eq!(state.current_chapter, "hero_ending");
        assert_eq!(engine.phase(), StoryPhase::Ended);
    }

    #[test]
    fn test_ending_sets_game_ended_and_waits_for_restart() {
        let (mut engine, mut state, clock) = started(features(false, true));

        engine.make_choice(1, &mut state, &clock).unwrap();

        assert!(state.game_status.game_ended);
        assert!(state.game_status.is_waiting_for_input);
        let outputs = engine.take_outputs();
        let ended = outputs.iter().find_map(|o| match o {
            EngineOutput::Notify(Notification::GameEnded {
                ending_type,
                choices_made,
                ..
            }) => Some((ending_type.clone(), *choices_made)),
            _ => None,
        });
        assert_eq!(ended, Some((Some("cozy".to_owned()), 1)));
    }

    #[test]
    fn test_restart_from_ending_resets_state() {
        // Arrange
        let (mut engine, mut state, clock) = setup(features(false, true));
        engine.load_chapter("lonely_path", &mut state, &clock).unwrap();
        engine.proceed_to_next(&mut state, &clock).unwrap();
        assert_eq!(state.player_stats.health, 80);
        engine.take_outputs();

        // Act
        engine.make_choice(0, &mut state, &clock).unwrap();

        // Assert
        assert_eq!(state.current_chapter, "start");
        assert_eq!(state.player_stats.health, 100);
        assert!(state.story_progress.choices_made.is_empty());
        assert!(!state.game_status.game_ended);
        let types = notification_types(&engine.take_outputs());
        assert_eq!(types[..2], ["choice_made", "adventure_restarted"]);
    }

    #[test]
    fn test_minigame_chapter_starts_task_and_blocks_proceed() {
        // Arrange
        let (mut engine, mut state, clock) = setup(features(false, true));

        // Act
        engine.load_chapter("bubble_trial", &mut state, &clock).unwrap();
        let outputs = engine.take_outputs();
        engine.proceed_to_next(&mut state, &clock).unwrap();

        // Assert
        assert_eq!(engine.phase(), StoryPhase::MinigameActive);
        assert!(state.game_status.minigame_active);
        assert!(!state.game_status.is_waiting_for_input);
        assert_eq!(engine.pending_task(), Some(minigame_task(&outputs)));
        assert_eq!(state.current_chapter, "bubble_trial");
    }

    #[test]
    fn test_minigame_completion_resumes_with_first_choice() {
        // Arrange
        let (mut engine, mut state, clock) = setup(features(false, true));
        engine.load_chapter("bubble_trial", &mut state, &clock).unwrap();
        let task = minigame_task(&engine.take_outputs());

        // Act
        engine
            .apply_signal(
                SideChannelSignal::Minigame {
                    task,
                    minigame_id: "bubble_pop".to_owned(),
                    event: MinigameEvent::Completed(result(true)),
                },
                &mut state,
                &clock,
            )
            .unwrap();

        // Assert
        assert_eq!(state.current_chapter, "ally_meeting");
        assert!(!state.game_status.minigame_active);
        assert_eq!(state.minigame_results.len(), 1);
        assert!(state.minigame_results[0].success);
        assert_eq!(
            notification_types(&engine.take_outputs())[0],
            "minigame_status"
        );
    }

    #[test]
    fn test_minigame_failure_resumes_like_success() {
        let (mut engine, mut state, clock) = setup(features(false, true));
        engine.load_chapter("bubble_trial", &mut state, &clock).unwrap();
        let task = minigame_task(&engine.take_outputs());

        engine
            .handle_minigame_failure(task, "bubble_pop", &result(false), &mut state, &clock)
            .unwrap();

        assert_eq!(state.current_chapter, "ally_meeting");
        assert!(!state.minigame_results[0].success);
    }

    #[test]
    fn test_stale_minigame_completion_is_ignored() {
        // Arrange
        let (mut engine, mut state, clock) = setup(features(false, true));
        engine.load_chapter("bubble_trial", &mut state, &clock).unwrap();
        let task = minigame_task(&engine.take_outputs());
        engine.jump_to_chapter("start", &mut state, &clock).unwrap();
        engine.take_outputs();

        // Act
        engine
            .continue_after_minigame(task, "bubble_pop", &result(true), &mut state, &clock)
            .unwrap();

        // Assert
        assert_eq!(state.current_chapter, "start");
        assert!(state.minigame_results.is_empty());
        assert!(engine.take_outputs().is_empty());
    }

    #[test]
    fn test_completion_is_consumed_once() {
        let (mut engine, mut state, clock) = setup(features(false, true));
        engine.load_chapter("bubble_trial", &mut state, &clock).unwrap();
        let task = minigame_task(&engine.take_outputs());

        engine
            .continue_after_minigame(task, "bubble_pop", &result(true), &mut state, &clock)
            .unwrap();
        engine
            .continue_after_minigame(task, "bubble_pop", &result(true), &mut state, &clock)
            .unwrap();

        assert_eq!(state.current_chapter, "ally_meeting");
        assert_eq!(state.minigame_results.len(), 1);
    }

    #[test]
    fn test_leaving_minigame_chapter_unloads_it() {
        let (mut engine, mut state, clock) = setup(features(false, true));
        engine.load_chapter("bubble_trial", &mut state, &clock).unwrap();
        engine.take_outputs();

        engine.jump_to_chapter("start", &mut state, &clock).unwrap();

        let outputs = engine.take_outputs();
        assert_eq!(
            outputs[0],
            EngineOutput::SideChannel(SideChannelRequest::UnloadMinigame)
        );
        assert!(!state.game_status.minigame_active);
        assert_eq!(engine.pending_task(), None);
    }

    #[test]
    fn test_audio_focus_enters_audio_playing_then_settles() {
        // Arrange
        let (mut engine, mut state, clock) = setup(features(true, true));
        engine.load_chapter("ally_meeting", &mut state, &clock).unwrap();
        let outputs = engine.take_outputs();
        let task = outputs
            .iter()
            .find_map(|o| match o {
                EngineOutput::SideChannel(SideChannelRequest::PlayAudio { task, chapter_id }) => {
                    assert_eq!(chapter_id, "ally_meeting");
                    Some(*task)
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(engine.phase(), StoryPhase::AudioPlaying);
        assert!(state.game_status.is_waiting_for_input);

        // Act
        for status in [AudioStatus::Started, AudioStatus::Finished] {
            engine
                .apply_signal(
                    SideChannelSignal::Audio {
                        task,
                        file: "chapter_ally_meeting_main.mp3".to_owned(),
                        status,
                    },
                    &mut state,
                    &clock,
                )
                .unwrap();
        }

        // Assert
        assert_eq!(engine.phase(), StoryPhase::AwaitingChoice);
        assert!(!state.game_status.audio_playing);
        assert_eq!(engine.pending_task(), None);
        assert_eq!(
            notification_types(&engine.take_outputs()),
            vec!["audio_status", "audio_status"]
        );
    }

    #[test]
    fn test_audio_focus_accepts_choice_while_playing() {
        let (mut engine, mut state, clock) = setup(features(true, true));
        engine.load_chapter("ally_meeting", &mut state, &clock).unwrap();
        engine.take_outputs();

        engine.make_choice(0, &mut state, &clock).unwrap();

        assert_eq!(state.current_chapter, "hero_ending");
        assert!(state.player_stats.has_ally);
        assert_eq!(state.player_stats.courage, "Brave");
        let outputs = engine.take_outputs();
        assert!(outputs.contains(&EngineOutput::SideChannel(SideChannelRequest::StopAudio)));
    }

    #[test]
    fn test_audio_disabled_story_chapter_requests_nothing() {
        let (mut engine, mut state, clock) = setup(features(false, true));

        engine.load_chapter("start", &mut state, &clock).unwrap();

        assert!(
            engine
                .take_outputs()
                .iter()
                .all(|o| matches!(o, EngineOutput::Notify(_)))
        );
    }

    #[test]
    fn test_jump_requires_development_mode() {
        let mut toggles = features(false, true);
        toggles.development_mode = false;
        let (mut engine, mut state, clock) = started(toggles);

        let jumped = engine.jump_to_chapter("hero_ending", &mut state, &clock).unwrap();

        assert!(!jumped);
        assert_eq!(state.current_chapter, "start");
    }

    #[test]
    fn test_navigation_utilities() {
        let (engine, state, _) = started(features(false, true));

        assert_eq!(engine.available_chapters().len(), 7);
        assert_eq!(engine.chapter_types().len(), 4);
        assert!(engine.validate_chapter_link("start", "nap_ending"));
        assert!(!engine.validate_chapter_link("nap_ending", "hero_ending"));
        let progress = engine.progress(&state);
        assert_eq!(progress.current_chapter, "start");
        assert_eq!(progress.chapters_completed, 1);
        assert!(!progress.game_ended);
    }

    #[test]
    fn test_generation_increments_per_load() {
        let (mut engine, mut state, clock) = started(features(false, true));
        let before = engine.generation();

        engine.make_choice(1, &mut state, &clock).unwrap();

        assert_eq!(engine.generation(), before + 1);
    }
}
