//src/main.rs
mod cli;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Duration, Local, NaiveDate};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::io::{self, stdout};
use tracing_subscriber::EnvFilter;

use liftcycle_lib::exercise::status;
use liftcycle_lib::{
    AppService, Backend, BaseExercise, DayView, ExerciseDraft, ExerciseStatus, ExerciseView,
    LifecycleError, PlanDraft, Store, Theme, WorkoutDay, WorkoutPlan, WorkoutSession,
    WorkoutSessionExercise,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    // --- Check for completion generation request FIRST ---
    let cli_args = cli::parse_args();
    let export_csv = cli_args.export_csv;
    tracing::debug!(?cli_args, "parsed arguments");

    if let cli::Commands::GenerateCompletion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();

        eprintln!("Generating completion script for {shell}...");
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    let mut service =
        AppService::initialize().context("Failed to initialize application service")?;
    let today = Local::now().date_naive();

    match cli_args.command {
        cli::Commands::GenerateCompletion { .. } => {
            unreachable!("Completion generation should have exited already");
        }

        // --- Account Commands ---
        cli::Commands::SignIn { username, password } => {
            let user = service.sign_in(&username, &password)?;
            println!("Signed in as '{}' (ID: {}).", user.username, user.id);
        }
        cli::Commands::SignUp { username, password } => {
            let user = service.sign_up(&username, &password)?;
            println!("Created and signed in as '{}' (ID: {}).", user.username, user.id);
        }
        cli::Commands::SignOut => {
            service.sign_out()?;
            println!("Signed out.");
        }
        cli::Commands::Whoami => match service.current_user() {
            Ok(user) => println!("{} (ID: {})", user.username, user.id),
            Err(_) => println!("Not signed in."),
        },

        // --- Plan Commands ---
        cli::Commands::Plan { action } => handle_plan(&service, action, today, export_csv)?,

        // --- Session Commands ---
        cli::Commands::Today { date, all } => {
            let view = with_plan_hint(service.day_as_of(date, today))?;
            let exercises = if all {
                match &view.session {
                    Some(s) => service.session_exercises(s.id, ExerciseView::IncludeDeleted)?,
                    None => Vec::new(),
                }
            } else {
                view.exercises.clone()
            };
            if export_csv {
                print_exercises_csv(&exercises)?;
            } else {
                print_day_header(&view);
                if !exercises.is_empty() {
                    print_exercise_table(&exercises, &service.config.theme);
                }
            }
        }
        cli::Commands::Done { id, date } => {
            let session = require_session(&service, date)?;
            let exercises = service.toggle_complete(&session, id)?;
            print_exercise_table(&exercises, &service.config.theme);
        }
        cli::Commands::Skip { id, date } => {
            let session = require_session(&service, date)?;
            let exercises = service.toggle_skip(&session, id)?;
            print_exercise_table(&exercises, &service.config.theme);
        }
        cli::Commands::Remove { id, date } => {
            let session = require_session(&service, date)?;
            let exercises = service.remove_exercise(&session, id)?;
            println!("Removed exercise {id}.");
            print_exercise_table(&exercises, &service.config.theme);
        }
        cli::Commands::Move { id, order, date } => {
            let session = require_session(&service, date)?;
            let exercises = service.reorder_exercise(&session, id, order)?;
            print_exercise_table(&exercises, &service.config.theme);
        }
        cli::Commands::Weight { id, value, date } => {
            let session = require_session(&service, date)?;
            let exercises = service.set_exercise_weight(&session, id, value)?;
            print_exercise_table(&exercises, &service.config.theme);
        }
        cli::Commands::Add {
            name,
            muscles,
            optional,
            base,
            date,
        } => {
            let session = require_session(&service, date)?;
            let draft = ExerciseDraft {
                name: name.unwrap_or_default(),
                muscles: liftcycle_lib::model::parse_muscle_list(&muscles),
                is_optional: optional,
                base_exercise_id: base,
            };
            let exercises = service.add_session_exercise(&session, &draft)?;
            print_exercise_table(&exercises, &service.config.theme);
        }
        cli::Commands::Finish { date } => match service.finish_session(date) {
            Ok(session) => println!("Session on {} completed (ID: {}).", session.date, session.id),
            Err(e)
                if matches!(
                    e.downcast_ref::<LifecycleError>(),
                    Some(LifecycleError::NoSession(_))
                ) =>
            {
                bail!("No session on {date}. Open it with 'today --date {date}' first.")
            }
            Err(e) => return Err(e),
        },
        cli::Commands::Upcoming => {
            let days = with_plan_hint(service.upcoming(today))?;
            if days.is_empty() {
                println!("No upcoming plan days.");
            } else if export_csv {
                print_plan_days_csv(&days)?;
            } else {
                print_plan_days_table(&days, &service.config.theme);
            }
        }
        cli::Commands::Calendar { month } => {
            let first = month.unwrap_or_else(|| today.with_day(1).unwrap_or(today));
            let last = last_day_of_month(first);
            let sessions = service.calendar(first, last)?;
            let plan = service.cached_active_plan();
            let cycle = match &plan {
                Some(p) => service.store.get_active_cycle(p.user_id)?,
                None => None,
            };
            let current = plan.as_ref().zip(cycle.map(|c| c.id));
            if sessions.is_empty() {
                println!("No sessions between {first} and {last}.");
            } else if export_csv {
                print_calendar_csv(&sessions, current)?;
            } else {
                print_calendar_table(&sessions, current, &service.config.theme);
            }
        }

        // --- Catalog Commands ---
        cli::Commands::Catalog { action } => match action.unwrap_or(cli::CatalogCommands::List) {
            cli::CatalogCommands::List => {
                let catalog = service.list_base_exercises()?;
                if catalog.is_empty() {
                    println!("The exercise catalog is empty.");
                } else if export_csv {
                    print_catalog_csv(&catalog)?;
                } else {
                    print_catalog_table(&catalog, &service.config.theme);
                }
            }
            cli::CatalogCommands::Add { name, muscles } => {
                let base = service.create_base_exercise(&name, &muscles)?;
                println!("Added catalog exercise '{}' (ID: {}).", base.name, base.id);
            }
        },

        // --- Config Commands ---
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => {
                println!("Config file: {}", service.get_config_path().display());
                println!("Backend: {:?}", service.config.backend);
                println!("API URL: {}", service.config.api_base_url);
                println!("Request timeout: {}s", service.config.request_timeout_secs);
                println!("Cache file: {}", service.cache.path().display());
            }
            cli::ConfigCommands::SetBackend { backend } => {
                let backend = match backend {
                    cli::BackendCli::Remote => Backend::Remote,
                    cli::BackendCli::Local => Backend::Local,
                };
                service.set_backend(backend)?;
                println!("Backend set to {backend:?}. Sign in again to continue.");
            }
            cli::ConfigCommands::SetApiUrl { url } => {
                service.set_api_base_url(&url)?;
                println!("API URL set to {}.", service.config.api_base_url);
            }
            cli::ConfigCommands::SetTimeout { seconds } => {
                service.config.set_request_timeout_secs(seconds)?;
                service.save_config()?;
                println!("Request timeout set to {seconds}s.");
            }
        },
    }

    Ok(())
}

fn handle_plan(
    service: &AppService,
    action: cli::PlanCommands,
    today: NaiveDate,
    export_csv: bool,
) -> Result<()> {
    match action {
        cli::PlanCommands::Show => {
            let plan = with_plan_hint(service.active_plan())?;
            println!(
                "{} (v{}, {}) ID: {}",
                plan.name, plan.version, plan.split_type, plan.id
            );
            let days = plan.days_in_order().into_iter().cloned().collect::<Vec<_>>();
            if export_csv {
                print_plan_days_csv(&days)?;
            } else {
                print_plan_days_table(&days, &service.config.theme);
            }
        }
        cli::PlanCommands::Create { file } => {
            let draft = PlanDraft::from_toml_file(&file)
                .with_context(|| format!("Failed to read plan draft {}", file.display()))?;
            let plan = service.create_plan(&draft, today)?;
            println!(
                "Created plan '{}' (ID: {}). Cycle starts today, {}.",
                plan.name, plan.id, today
            );
        }
        cli::PlanCommands::Edit { file } => {
            let draft = PlanDraft::from_toml_file(&file)
                .with_context(|| format!("Failed to read plan draft {}", file.display()))?;
            let plan = with_plan_hint(service.edit_plan(&draft, today))?;
            println!(
                "Saved '{}' as version {} (ID: {}). Sessions already opened keep their exercises.",
                plan.name, plan.version, plan.id
            );
        }
        cli::PlanCommands::Retire => {
            let report = service.retire_plan(today)?;
            println!("Plan retired.");
            if let Some(stale) = report.stale_session {
                eprintln!(
                    "Warning: today's session could not be removed ({}). It will be replaced when a new plan starts.",
                    stale.error
                );
            }
        }
        cli::PlanCommands::History => {
            let plans = service.plan_history()?;
            if plans.is_empty() {
                println!("No plans yet.");
            } else if export_csv {
                print_plan_history_csv(&plans)?;
            } else {
                print_plan_history_table(&plans, &service.config.theme);
            }
        }
        cli::PlanCommands::Template { from_active } => {
            let draft = if from_active {
                PlanDraft::from_plan(&with_plan_hint(service.active_plan())?)
            } else {
                PlanDraft::new("My Plan", "custom")
            };
            print!("{}", draft.to_toml_string()?);
        }
    }
    Ok(())
}

/// Rewrites a missing-plan error into a pointer at plan creation.
fn with_plan_hint<T>(result: Result<T>) -> Result<T> {
    result.map_err(|e| {
        if matches!(
            e.downcast_ref::<LifecycleError>(),
            Some(LifecycleError::NoActivePlan)
        ) {
            e.context(
                "Create one with 'plan template > plan.toml' followed by 'plan create plan.toml'",
            )
        } else {
            e
        }
    })
}

/// Changes apply to a session already opened with `today`; they never open one.
fn require_session(service: &AppService, date: NaiveDate) -> Result<WorkoutSession> {
    service.session_for_update(date).map_err(|e| {
        if matches!(
            e.downcast_ref::<LifecycleError>(),
            Some(LifecycleError::NoSession(_))
        ) {
            e.context(format!("Open it first with 'today --date {date}'"))
        } else {
            e
        }
    })
}

fn last_day_of_month(first: NaiveDate) -> NaiveDate {
    let (y, m) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1).map_or(first, |next| next - Duration::days(1))
}

fn theme_color(name: &str, fallback: Color) -> Color {
    liftcycle_lib::parse_color(name)
        .map(Color::from)
        .unwrap_or(fallback)
}

fn new_table(headers: &[&str], theme: &Theme) -> Table {
    let header_color = theme_color(&theme.header_color, Color::Green);
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).fg(header_color))
                .collect::<Vec<_>>(),
        );
    table
}

fn format_weight(weight: Option<f64>) -> String {
    weight.map_or_else(|| "-".to_string(), |w| format!("{w:.1}"))
}

fn print_day_header(view: &DayView) {
    let weekday = view.date.format("%A");
    match (&view.session, &view.plan_day) {
        (None, _) => println!("{} ({weekday}): no plan day applies.", view.date),
        (Some(_), Some(day)) if !day.is_rest_day() => {
            let done = view.session.as_ref().is_some_and(|s| s.is_completed);
            println!(
                "{} ({weekday}): {}{}",
                view.date,
                day.label,
                if done { " [completed]" } else { "" }
            );
        }
        (Some(_), _) if view.exercises.is_empty() => {
            println!("{} ({weekday}): rest day.", view.date);
        }
        (Some(_), _) => println!("{} ({weekday}):", view.date),
    }
}

/// Prints session exercises with status colours from the theme.
fn print_exercise_table(exercises: &[WorkoutSessionExercise], theme: &Theme) {
    let completed_color = theme_color(&theme.completed_color, Color::Green);
    let skipped_color = theme_color(&theme.skipped_color, Color::DarkGrey);
    let mut table = new_table(
        &["ID", "Order", "Exercise", "Muscles", "Status", "Weight", "Optional"],
        theme,
    );

    for e in exercises {
        let mut status_cell = Cell::new(status(e).to_string());
        status_cell = match status(e) {
            ExerciseStatus::Completed => status_cell.fg(completed_color),
            ExerciseStatus::Skipped => status_cell.fg(skipped_color),
            ExerciseStatus::Pending => status_cell,
        };
        let mut name_cell = Cell::new(&e.name);
        if e.is_deleted {
            name_cell = name_cell.add_attribute(Attribute::CrossedOut);
        }
        table.add_row(vec![
            Cell::new(e.id.to_string()),
            Cell::new(e.order.to_string()),
            name_cell,
            Cell::new(e.muscles.join(", ")),
            status_cell,
            Cell::new(format_weight(e.weight)),
            Cell::new(if e.is_optional { "yes" } else { "" }),
        ]);
    }
    println!("{table}");
}

fn print_exercises_csv(exercises: &[WorkoutSessionExercise]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record([
        "Id", "Order", "Exercise", "Muscles", "Status", "Weight", "Optional", "Deleted",
    ])?;
    for e in exercises {
        writer.write_record(&[
            e.id.to_string(),
            e.order.to_string(),
            e.name.clone(),
            e.muscles.join(";"),
            status(e).to_string(),
            e.weight.map(|w| w.to_string()).unwrap_or_default(),
            e.is_optional.to_string(),
            e.is_deleted.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_plan_days_table(days: &[WorkoutDay], theme: &Theme) {
    let mut table = new_table(&["Day", "Label", "Exercises"], theme);
    for day in days {
        let exercises = day
            .exercises
            .iter()
            .map(|e| {
                if e.is_optional {
                    format!("{} (optional)", e.name)
                } else {
                    e.name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            Cell::new(weekday_name(day.order)),
            Cell::new(&day.label),
            Cell::new(exercises),
        ]);
    }
    println!("{table}");
}

fn print_plan_days_csv(days: &[WorkoutDay]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Day", "Label", "Exercises"])?;
    for day in days {
        let names: Vec<&str> = day.exercises.iter().map(|e| e.name.as_str()).collect();
        writer.write_record(&[
            weekday_name(day.order).to_string(),
            day.label.clone(),
            names.join(";"),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_plan_history_table(plans: &[WorkoutPlan], theme: &Theme) {
    let mut table = new_table(&["ID", "Group", "Version", "Name", "Split", "Active"], theme);
    for plan in plans {
        table.add_row(vec![
            Cell::new(plan.id.to_string()),
            Cell::new(plan.group_id.to_string()),
            Cell::new(plan.version.to_string()),
            Cell::new(&plan.name),
            Cell::new(&plan.split_type),
            Cell::new(if plan.is_active { "*" } else { "" }),
        ]);
    }
    println!("{table}");
}

fn print_plan_history_csv(plans: &[WorkoutPlan]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Id", "Group", "Version", "Name", "Split", "Active"])?;
    for plan in plans {
        writer.write_record(&[
            plan.id.to_string(),
            plan.group_id.to_string(),
            plan.version.to_string(),
            plan.name.clone(),
            plan.split_type.clone(),
            plan.is_active.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

// Sessions of earlier cycles show their index only
fn day_label(session: &WorkoutSession, current: Option<(&WorkoutPlan, i64)>) -> String {
    current
        .filter(|(_, cycle_id)| *cycle_id == session.workout_cycle_id)
        .and_then(|(p, _)| p.day(session.cycle_day_index))
        .map_or_else(
            || format!("day {}", session.cycle_day_index),
            |d| d.label.clone(),
        )
}

fn print_calendar_table(
    sessions: &[WorkoutSession],
    current: Option<(&WorkoutPlan, i64)>,
    theme: &Theme,
) {
    let completed_color = theme_color(&theme.completed_color, Color::Green);
    let mut table = new_table(&["Date", "Weekday", "Plan Day", "Completed"], theme);
    for s in sessions {
        let done = if s.is_completed {
            Cell::new("yes").fg(completed_color)
        } else {
            Cell::new("")
        };
        table.add_row(vec![
            Cell::new(s.date.to_string()),
            Cell::new(s.date.format("%a").to_string()),
            Cell::new(day_label(s, current)),
            done,
        ]);
    }
    println!("{table}");
}

fn print_calendar_csv(
    sessions: &[WorkoutSession],
    current: Option<(&WorkoutPlan, i64)>,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Date", "Plan_Day", "Completed"])?;
    for s in sessions {
        writer.write_record(&[
            s.date.to_string(),
            day_label(s, current),
            s.is_completed.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_catalog_table(catalog: &[BaseExercise], theme: &Theme) {
    let mut table = new_table(&["ID", "Name", "Muscles"], theme);
    for base in catalog {
        table.add_row(vec![
            Cell::new(base.id.to_string()),
            Cell::new(&base.name),
            Cell::new(base.muscles.join(", ")),
        ]);
    }
    println!("{table}");
}

fn print_catalog_csv(catalog: &[BaseExercise]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Id", "Name", "Muscles"])?;
    for base in catalog {
        writer.write_record(&[base.id.to_string(), base.name.clone(), base.muscles.join(";")])?;
    }
    writer.flush()?;
    Ok(())
}

fn weekday_name(order: u8) -> &'static str {
    match order {
        0 => "Sunday",
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        6 => "Saturday",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_end_handles_december_and_leap_years() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(last_day_of_month(d(2024, 2, 1)), d(2024, 2, 29));
        assert_eq!(last_day_of_month(d(2023, 12, 1)), d(2023, 12, 31));
        assert_eq!(last_day_of_month(d(2023, 4, 1)), d(2023, 4, 30));
    }

    #[test]
    fn calendar_labels_only_sessions_of_the_running_cycle() {
        let plan = WorkoutPlan {
            id: 3,
            group_id: 3,
            version: 1,
            user_id: 1,
            name: "Pull".into(),
            split_type: "custom".into(),
            cycle_length_days: 7,
            is_active: true,
            workout_days: vec![WorkoutDay {
                label: "Pull".into(),
                order: 2,
                exercises: vec![],
            }],
        };
        let session = |workout_cycle_id| WorkoutSession {
            id: 1,
            user_id: 1,
            workout_cycle_id,
            cycle_day_index: 2,
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            is_completed: true,
        };
        assert_eq!(day_label(&session(5), Some((&plan, 5))), "Pull");
        assert_eq!(day_label(&session(4), Some((&plan, 5))), "day 2");
        assert_eq!(day_label(&session(5), None), "day 2");
    }
}
