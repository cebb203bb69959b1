//! Deterministic classifier stub
//!
//! Replies are scripted in order; the last reply repeats once the script
//! runs out.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tunnel_inspect::services::{
    ClassificationRequest, ClassifierError, DefectClassifier, RawClassification,
};

#[derive(Debug, Clone)]
pub enum StubReply {
    Success(RawClassification),
    Unavailable(String),
    Malformed(String),
    /// Sleep, then answer with the inner reply
    Delayed(Duration, Box<StubReply>),
}

pub struct StubClassifier {
    script: Mutex<VecDeque<StubReply>>,
    last: Mutex<Option<StubReply>>,
    calls: Mutex<Vec<ClassificationRequest>>,
}

impl StubClassifier {
    pub fn new(replies: Vec<StubReply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: StubReply) -> Self {
        Self::new(vec![reply])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<ClassificationRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn next_reply(&self) -> StubReply {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = script.pop_front() {
            *last = Some(reply);
        }
        last.clone().expect("stub classifier has no scripted reply")
    }
}

/// Raw classifier result with no crack metrics
pub fn raw_result(defect_type: &str, severity: &str, confidence: f64) -> RawClassification {
    RawClassification {
        defect_type: defect_type.to_string(),
        severity: severity.to_string(),
        confidence,
        crack_density: None,
        avg_crack_length: None,
        max_crack_width: None,
        predicted_days_to_fix: None,
    }
}

#[async_trait]
impl DefectClassifier for StubClassifier {
    async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> Result<RawClassification, ClassifierError> {
        self.calls.lock().unwrap().push(request);

        let mut reply = self.next_reply();
        loop {
            match reply {
                StubReply::Success(result) => return Ok(result),
                StubReply::Unavailable(msg) => return Err(ClassifierError::Unavailable(msg)),
                StubReply::Malformed(msg) => return Err(ClassifierError::MalformedResponse(msg)),
                StubReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}
