//! Disambiguation coordinator
//!
//! Resolves ambiguous object references and vague spatial phrases by asking
//! the client, one prompt at a time, and writes what the user chose into a
//! clarification transcript for reclassification.

use tracing::{debug, info};

use crate::domain::ClassificationResult;
use crate::error::TaskError;
use crate::protocol::ClientLink;

/// Run every clarification `result` asks for and return the transcript
///
/// A phrase whose candidate set has exactly one member resolves without a
/// round trip. Prompts are issued strictly one after another.
pub async fn clarify(link: &mut ClientLink, result: &ClassificationResult) -> Result<String, TaskError> {
    debug!(
        requires_disambiguation = result.requires_disambiguation,
        requires_pointing = result.requires_pointing,
        "clarify: called"
    );
    validate(result)?;
    let mut transcript = String::new();

    if result.requires_disambiguation {
        let candidates = &result.disambiguation_candidates;
        for phrase in &result.disambiguation_phrases {
            let chosen = if let [only] = candidates.as_slice() {
                debug!(%phrase, %only, "clarify: single candidate, resolving without prompt");
                only.clone()
            } else {
                link.request_object_pointing(phrase, candidates).await?
            };
            info!(%phrase, %chosen, "Object reference clarified");
            transcript.push_str(&format!(
                "For the disambiguation phrase {}, the user clarified object: {}\n",
                phrase, chosen
            ));
        }
    }

    if result.requires_pointing {
        for phrase in &result.spatial_phrases {
            let location = link.request_location_pointing(phrase).await?;
            info!(%phrase, %location, "Spatial reference clarified");
            transcript.push_str(&format!(
                "For the spatial phrase {}, the user pointed to location: {}\n",
                phrase, location
            ));
        }
    }

    Ok(transcript)
}

/// The classifier is unreliable; its flags must come with something to ask about
fn validate(result: &ClassificationResult) -> Result<(), TaskError> {
    if result.requires_disambiguation
        && (result.disambiguation_candidates.is_empty() || result.disambiguation_phrases.is_empty())
    {
        return Err(TaskError::malformed(
            "classifier",
            "disambiguation requested without candidates or phrases",
        ));
    }
    if result.requires_pointing && result.spatial_phrases.is_empty() {
        return Err(TaskError::malformed("classifier", "pointing requested without spatial phrases"));
    }
    Ok(())
}
