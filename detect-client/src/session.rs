//! Detection session state machine
//!
//! idle → loading → success | error, with reset back to idle from any
//! state. One request in flight at a time; submitting while loading is
//! rejected rather than queued.

use std::path::Path;

use crate::api::{ApiClient, ClientError, DetectionSettings, ProcessedImage};

const MIN_THRESHOLD: f32 = 0.1;
const MAX_THRESHOLD: f32 = 0.9;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Loading,
    Success(ProcessedImage),
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a detection request is already in flight")]
    RequestInFlight,

    #[error(transparent)]
    Client(#[from] ClientError),
}

pub struct DetectionSession {
    client: ApiClient,
    settings: DetectionSettings,
    state: SessionState,
}

impl DetectionSession {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            settings: DetectionSettings::default(),
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn settings(&self) -> DetectionSettings {
        self.settings
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, SessionState::Loading)
    }

    /// Update thresholds, clamped to the slider range.
    pub fn update_settings(&mut self, confidence_threshold: f32, iou_threshold: f32) {
        self.settings = DetectionSettings {
            confidence_threshold: confidence_threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD),
            iou_threshold: iou_threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD),
        };
    }

    /// Upload an image and drive the session through loading into
    /// success or error. Terminal states persist until [`reset`].
    ///
    /// [`reset`]: Self::reset
    pub async fn submit(&mut self, image: &Path) -> Result<ProcessedImage, SessionError> {
        if self.is_loading() {
            return Err(SessionError::RequestInFlight);
        }

        self.state = SessionState::Loading;

        match self.client.detect(image, &self.settings).await {
            Ok(result) => {
                self.state = SessionState::Success(result.clone());
                Ok(result)
            }
            Err(e) => {
                let message = e.to_string();
                self.state = SessionState::Error(message);
                Err(SessionError::Client(e))
            }
        }
    }

    /// Back to idle from any state.
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
    }
}
