use crate::detection::domain::detection_params::ParamsUpdate;
use crate::shared::error::PipelineError;

/// Discrete events that steer a running pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Quit,
    Pause,
    Resume,
    TogglePause,
    SaveScreenshot,
    UpdateParams(ParamsUpdate),
}

/// Parses one line of a text control channel.
///
/// `q`, `p` and `s` (any case, surrounding whitespace ignored) map to quit,
/// pause toggle and screenshot; `pause`/`resume`/`quit` are accepted
/// spelled out; a JSON object is a parameter update. Blank lines yield
/// `Ok(None)`.
pub fn parse_control_line(line: &str) -> Result<Option<ControlCommand>, PipelineError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.starts_with('{') {
        let update: ParamsUpdate = serde_json::from_str(trimmed)
            .map_err(|e| PipelineError::InvalidParameter(format!("bad parameter update: {e}")))?;
        return Ok(Some(ControlCommand::UpdateParams(update)));
    }
    let command = match trimmed.to_lowercase().as_str() {
        "q" | "quit" | "exit" => ControlCommand::Quit,
        "p" => ControlCommand::TogglePause,
        "pause" => ControlCommand::Pause,
        "resume" => ControlCommand::Resume,
        "s" | "screenshot" => ControlCommand::SaveScreenshot,
        other => {
            return Err(PipelineError::InvalidParameter(format!(
                "unknown control command '{other}'"
            )))
        }
    };
    Ok(Some(command))
}
