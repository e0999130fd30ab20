//! One observe → decide → act → reflect round.
//!
//! Round-local failures ([`RoundFailure`]) are contained here: they are logged,
//! folded into the summary the next prompt sees, and the round ends early.
//! Only failures to write the session logs escape as errors.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::action::{ActionCommand, InteractionMode, KeyName};
use crate::core::action_parser::{ActionResponse, parse_action_response};
use crate::core::reflection_parser::{ReflectionOutcome, Verdict, parse_reflection};
use crate::core::snapshot::{SnapshotConfig, build_element_list};
use crate::core::state::AgentState;
use crate::core::types::{ElementList, ScreenSize};
use crate::dispatch::{DispatchContext, Target, dispatch};
use crate::error::RoundFailure;
use crate::io::annotate::{LabelRenderer, labeled_or_raw};
use crate::io::config::ExplorerConfig;
use crate::io::device::{Device, DeviceError, keycode};
use crate::io::doc_store::DocStore;
use crate::io::model::Model;
use crate::io::prompt::{PromptEngine, ReflectInputs, documentation_context, element_details};
use crate::io::round_log::{RoundLog, RoundRecord};
use crate::io::workspace::RunPaths;

/// Everything a round needs that stays fixed for the whole session.
pub struct Session<'a, D, M> {
    pub device: &'a D,
    pub model: &'a M,
    pub prompts: PromptEngine,
    pub docs: DocStore,
    pub paths: RunPaths,
    pub log: RoundLog,
    pub labels: LabelRenderer,
    pub dispatch: DispatchContext,
    pub description: String,
    pub package: String,
    pub request_interval: Duration,
    pub snapshot: SnapshotConfig,
}

impl<'a, D: Device, M: Model> Session<'a, D, M> {
    pub fn new(
        device: &'a D,
        model: &'a M,
        config: &ExplorerConfig,
        paths: RunPaths,
        screen: ScreenSize,
        description: &str,
        package: &str,
    ) -> Result<Self> {
        let docs = DocStore::open(&paths.docs_dir, config.agent.doc_refine)?;
        Ok(Self {
            device,
            model,
            prompts: PromptEngine::new(),
            docs,
            log: RoundLog::new(&paths.logs_dir),
            paths,
            labels: LabelRenderer::new(config.agent.dark_mode),
            dispatch: DispatchContext::new(
                screen,
                config.agent.grid_cell_px,
                config.agent.long_press_ms,
            ),
            description: description.to_string(),
            package: package.to_string(),
            request_interval: config.agent.request_interval(),
            snapshot: config.agent.snapshot(),
        })
    }
}

/// Model exchanges and outcome facts gathered while a round runs.
#[derive(Debug, Default)]
struct RoundTrace {
    decision: Option<(String, String)>,
    reflection: Option<(String, String)>,
    action: Option<String>,
    target_uid: Option<String>,
    verdict: Option<String>,
}

struct Capture {
    screenshot: PathBuf,
    xml: PathBuf,
}

/// Play round `round` and append its record to the session logs.
#[instrument(skip_all, fields(round = round, mode = %state.mode))]
pub fn run_round<D: Device, M: Model>(
    session: &Session<'_, D, M>,
    state: &mut AgentState,
    round: u32,
) -> Result<RoundRecord> {
    let started = Instant::now();
    let mut trace = RoundTrace::default();
    let result = play(session, state, round, &mut trace);

    if let Some((prompt, reply)) = &trace.decision {
        session.log.decision(round, state.mode, prompt, reply)?;
    }
    if let Some((prompt, reply)) = &trace.reflection {
        session.log.reflection(round, state.mode, prompt, reply)?;
    }

    let failure = match result {
        Ok(()) => None,
        Err(failure) => {
            warn!(error = %failure, "round abandoned");
            let message = failure.to_string();
            state.note_failure(&message);
            pause(session.request_interval);
            Some(message)
        }
    };

    let record = RoundRecord {
        round,
        mode: state.mode,
        action: trace.action.unwrap_or_else(|| "none".to_string()),
        target_uid: trace.target_uid,
        verdict: trace.verdict,
        summary: state.last_action_summary.clone(),
        failure,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    session.log.record(&record)?;
    Ok(record)
}

fn play<D: Device, M: Model>(
    session: &Session<'_, D, M>,
    state: &mut AgentState,
    round: u32,
    trace: &mut RoundTrace,
) -> Result<(), RoundFailure> {
    let before = capture(session, &format!("{round}_before"), &round.to_string())?;
    let elements = load_elements(&before.xml, &session.snapshot, state)?;
    let labeled = annotate(
        session,
        state.interaction(),
        &before.screenshot,
        &format!("{round}_before_labeled.png"),
        &elements,
    );

    let docs = documentation_context(&elements, |uid| {
        session.docs.load(uid).unwrap_or_else(|err| {
            warn!(uid, error = %format!("{err:#}"), "documentation unreadable");
            None
        })
    });
    let prompt = session
        .prompts
        .decide(
            state.mode,
            state.interaction(),
            &session.description,
            &state.last_action_summary,
            &docs,
        )
        .map_err(|err| RoundFailure::Prompt(format!("{err:#}")))?;
    let reply = ask(session.model, prompt, &[labeled.as_path()], &mut trace.decision)?;

    let response = parse_action_response(&reply, state.interaction());
    let command = &response.command;
    trace.action = Some(command.name().to_string());
    debug!(action = %command, "decision parsed");

    match command {
        ActionCommand::Error { reason } => {
            warn!(raw = %reply, "unusable decision");
            return Err(RoundFailure::Parse(reason.clone()));
        }
        ActionCommand::Finish => {
            if state.record_finish() {
                info!("task reported complete");
                state.last_action_summary = summary_of(&response);
            } else {
                warn!("unexpected FINISH in explore mode, ignored");
                state.last_action_summary =
                    "FINISH is not available while exploring; keep exploring.".to_string();
            }
            return Ok(());
        }
        _ => {}
    }

    let target = dispatch(session.device, &session.dispatch, state, command, &elements)?;
    let summary = summary_of(&response);
    state.last_action_summary = summary.clone();
    info!(
        action = command.name(),
        uid = target.as_ref().map(|t| t.element.uid.as_str()),
        "action executed"
    );
    if command.is_grid_toggle() {
        return Ok(());
    }
    trace.target_uid = target.as_ref().map(|t| t.element.uid.clone());
    pause(session.request_interval);

    if let Err(failure) = reflect(
        session,
        state,
        round,
        command,
        target.as_ref(),
        &summary,
        &labeled,
        trace,
    ) {
        warn!(error = %failure, "reflection failed");
        trace.verdict = Some(Verdict::Error.as_str().to_string());
        state.last_action_summary = format!("{summary} (reflection failed: {failure})");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn reflect<D: Device, M: Model>(
    session: &Session<'_, D, M>,
    state: &mut AgentState,
    round: u32,
    command: &ActionCommand,
    target: Option<&Target>,
    summary: &str,
    before_labeled: &Path,
    trace: &mut RoundTrace,
) -> Result<(), RoundFailure> {
    let after_name = format!("{round}_after");
    let after = capture(session, &after_name, &after_name)?;
    let after_elements = load_elements(&after.xml, &session.snapshot, state)?;
    let after_labeled = annotate(
        session,
        state.interaction(),
        &after.screenshot,
        &format!("{round}_after_labeled.png"),
        &after_elements,
    );

    let details = element_details(command, target.map(|t| (t.label, &t.element)));
    let prompt = session
        .prompts
        .reflect(&ReflectInputs {
            mode: state.mode,
            description: &session.description,
            action_type: command.name(),
            element_details: &details,
            last_summary: summary,
        })
        .map_err(|err| RoundFailure::Prompt(format!("{err:#}")))?;
    let reply = ask(
        session.model,
        prompt,
        &[before_labeled, after_labeled.as_path()],
        &mut trace.reflection,
    )?;

    let outcome = parse_reflection(&reply);
    trace.verdict = Some(outcome.verdict.as_str().to_string());
    if outcome.verdict == Verdict::Error {
        warn!(raw = %reply, "unusable reflection");
        return Err(RoundFailure::Parse(outcome.error.unwrap_or_default()));
    }
    info!(verdict = %outcome.verdict, "reflection parsed");
    apply_verdict(session, state, &outcome, target);
    Ok(())
}

fn apply_verdict<D: Device, M: Model>(
    session: &Session<'_, D, M>,
    state: &mut AgentState,
    outcome: &ReflectionOutcome,
    target: Option<&Target>,
) {
    if let Some(target) = target
        && outcome.verdict.blacklists_target()
        && state.blacklist(&target.element.uid)
    {
        info!(uid = %target.element.uid, verdict = %outcome.verdict, "element blacklisted");
    }

    if outcome.verdict == Verdict::Back {
        if let Some(code) = keycode(KeyName::Back)
            && let Err(err) = session.device.press_keycode(code)
        {
            warn!(error = %err, "back navigation after reflection failed");
        }
        pause(session.request_interval);
    }

    if outcome.verdict != Verdict::Ineffective
        && let Some(documentation) = &outcome.documentation
        && let Some(target) = target
    {
        match session.docs.record(&target.element.uid, documentation) {
            Ok(write) => info!(uid = %target.element.uid, ?write, "documentation saved"),
            Err(err) => warn!(uid = %target.element.uid, error = %format!("{err:#}"), "documentation write failed"),
        }
    }
}

/// Call the model and remember the exchange for the session log.
fn ask<M: Model>(
    model: &M,
    prompt: String,
    images: &[&Path],
    slot: &mut Option<(String, String)>,
) -> Result<String, RoundFailure> {
    match model.respond(&prompt, images) {
        Ok(reply) => {
            *slot = Some((prompt, reply.clone()));
            Ok(reply)
        }
        Err(err) => {
            *slot = Some((prompt, format!("<model call failed: {err}>")));
            Err(err.into())
        }
    }
}

fn capture<D: Device, M: Model>(
    session: &Session<'_, D, M>,
    screenshot_name: &str,
    xml_name: &str,
) -> Result<Capture, RoundFailure> {
    let screenshot = session
        .device
        .capture_screenshot(screenshot_name, &session.paths.screenshots_dir)?;
    let xml = session
        .device
        .dump_ui_tree(xml_name, &session.paths.xmls_dir)?;
    Ok(Capture { screenshot, xml })
}

/// Elements of a dumped hierarchy minus blacklisted uids. An unparseable
/// document yields an empty list.
fn load_elements(
    xml_path: &Path,
    config: &SnapshotConfig,
    state: &AgentState,
) -> Result<ElementList, RoundFailure> {
    let xml = fs::read_to_string(xml_path).map_err(DeviceError::from)?;
    match build_element_list(&xml, config, state.blacklisted()) {
        Ok(elements) => Ok(elements),
        Err(err) => {
            warn!(path = %xml_path.display(), error = %err, "ui hierarchy unparseable, no elements");
            Ok(ElementList::default())
        }
    }
}

fn annotate<D: Device, M: Model>(
    session: &Session<'_, D, M>,
    interaction: InteractionMode,
    screenshot: &Path,
    file_name: &str,
    elements: &ElementList,
) -> PathBuf {
    let dst = session.paths.screenshots_dir.join(file_name);
    labeled_or_raw(screenshot, &dst, |src, dst| match interaction {
        InteractionMode::Element => session.labels.label_elements(src, dst, elements),
        InteractionMode::Grid => session.labels.draw_grid(src, dst, &session.dispatch.grid),
    })
}

fn summary_of(response: &ActionResponse) -> String {
    let summary = response.summary.trim();
    if summary.is_empty() {
        format!("Performed {}", response.raw_action.trim())
    } else {
        summary.to_string()
    }
}

pub(crate) fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
