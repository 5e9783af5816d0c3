use crate::infra::{drain, ApiPipelineService, ChannelNotifier};
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use talent_pipeline::error::AppError;
use talent_pipeline::workflows::hiring::{
    ActorId, Answer, AnswerOption, ApplicationStatusView, CandidateId, FinalDecision,
    InMemoryPipelineStore, JobId, OverallStatus, PipelineConfig, PipelineNotification,
    PipelineService, PipelineServiceError, PipelineView, Question, QuestionKind, RoundDraft,
    RoundId, RoundKind, RoundOutcome, TestSetup,
};

const RECRUITER: &str = "recruiter-demo";
const QUESTIONS: usize = 5;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Park candidates who clear the final round until a recruiter finalizes them.
    #[arg(long)]
    pub(crate) final_decision_gate: bool,
    /// Print compact JSON instead of the pretty-printed ledgers.
    #[arg(long)]
    pub(crate) compact: bool,
}

/// Both ledgers after the scenario, plus everything the notifier was handed.
#[derive(Debug, Serialize)]
pub(crate) struct DemoReport {
    pub(crate) pipeline: PipelineView,
    pub(crate) applications: BTreeMap<CandidateId, Vec<ApplicationStatusView>>,
    pub(crate) notifications: Vec<PipelineNotification>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    println!("Talent pipeline demo");
    let report = build_demo_report(args.final_decision_gate)?;

    for candidate in &report.pipeline.candidates {
        println!(
            "- {}: {} (version {})",
            candidate.applicant,
            candidate.overall_status.label(),
            candidate.version
        );
    }
    println!("{} notifications queued\n", report.notifications.len());

    let rendered = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{rendered}");
    Ok(())
}

/// Walk three candidates through aptitude, technical, and HR rounds against the in-memory store.
pub(crate) fn build_demo_report(final_decision_gate: bool) -> Result<DemoReport, AppError> {
    let store = Arc::new(InMemoryPipelineStore::default());
    let (notifier, mut outbox) = ChannelNotifier::new();
    let config = PipelineConfig {
        final_decision_gate,
        ..PipelineConfig::default()
    };
    let service: ApiPipelineService =
        PipelineService::new(store.clone(), Arc::new(notifier), store, config);
    let recruiter = ActorId::new(RECRUITER);

    let job = service.create_job(&recruiter, "Backend Engineer")?;
    let pipeline = service.define_pipeline(
        &recruiter,
        &job.id,
        vec![
            RoundDraft::aptitude("Aptitude", 60),
            RoundDraft::new("Technical", RoundKind::Technical),
            RoundDraft::new("HR", RoundKind::Hr),
        ],
    )?;
    let rounds = pipeline.ordered_ids();
    let test = pipeline
        .first_aptitude()
        .and_then(|round| round.aptitude_test.clone())
        .ok_or(PipelineServiceError::NoAptitudeRound)?;
    service.configure_test(&recruiter, &test, question_bank())?;

    let ada = CandidateId::new("ada");
    let ben = CandidateId::new("ben");
    let cleo = CandidateId::new("cleo");
    for candidate in [&ada, &ben, &cleo] {
        enroll(&service, &recruiter, &job.id, candidate)?;
    }

    service.submit_aptitude_attempt(&ActorId::from(&ada), &test, &ada, answer_sheet(4))?;
    service.submit_aptitude_attempt(&ActorId::from(&ben), &test, &ben, answer_sheet(2))?;
    service.submit_aptitude_attempt(&ActorId::from(&cleo), &test, &cleo, answer_sheet(3))?;

    advance_to_offer(&service, &recruiter, &job.id, &ada, rounds.iter().skip(1))?;
    service.finalize(&recruiter, &job.id, &cleo, FinalDecision::Rejected)?;

    let mut applications = BTreeMap::new();
    for candidate in [ada, ben, cleo] {
        let views = service.candidate_applications(&recruiter, &candidate)?;
        applications.insert(candidate, views);
    }

    Ok(DemoReport {
        pipeline: service.pipeline_view(&recruiter, &job.id)?,
        applications,
        notifications: drain(&mut outbox),
    })
}

fn enroll(
    service: &ApiPipelineService,
    recruiter: &ActorId,
    job: &JobId,
    candidate: &CandidateId,
) -> Result<(), AppError> {
    service.apply(job, candidate)?;
    service.screen_application(recruiter, job, candidate, true)?;
    service.admit_candidate(recruiter, job, candidate)?;
    Ok(())
}

fn advance_to_offer<'a>(
    service: &ApiPipelineService,
    recruiter: &ActorId,
    job: &JobId,
    candidate: &CandidateId,
    rounds: impl Iterator<Item = &'a RoundId>,
) -> Result<(), AppError> {
    let mut status = OverallStatus::InProcess;
    for round in rounds {
        let progress = service.record_round_outcome(
            recruiter,
            job,
            candidate,
            round,
            RoundOutcome::passed().scored(85.0).noting("strong signal"),
        )?;
        status = progress.overall_status;
    }
    if status == OverallStatus::AwaitingFinalDecision {
        service.finalize(recruiter, job, candidate, FinalDecision::Hired)?;
    }
    Ok(())
}

fn question_bank() -> TestSetup {
    let question = |index: usize| Question {
        text: format!("Question {}", index + 1),
        kind: QuestionKind::MultipleChoice,
        options: ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(option, text)| AnswerOption {
                text: text.to_string(),
                is_correct: option == 0,
            })
            .collect(),
        points: 20,
    };
    TestSetup {
        questions: (0..QUESTIONS).map(question).collect(),
        passing_score_percent: 60,
        duration_minutes: 30,
    }
}

fn answer_sheet(correct: usize) -> BTreeMap<usize, Answer> {
    (0..QUESTIONS)
        .map(|index| (index, Answer::Choice(if index < correct { 0 } else { 1 })))
        .collect()
}
