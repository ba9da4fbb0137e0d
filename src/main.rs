use anyhow::Context;
use time::{OffsetDateTime, UtcOffset};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use mealmind_diary::{
    cli::{self, Command},
    conversation::{local_now, Session},
    meals::{copy_eaten_at, MealType},
    state::AppState,
    stats, MealError,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "mealmind_diary=debug,reqwest=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let state = AppState::init().context("load configuration")?;
    tracing::info!(api = %state.config.api.base_url, "diary started");

    let session = Session::new(state);
    for msg in session.messages().await {
        println!("{}", msg.content);
    }

    let mut hint: Option<MealType> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let cmd = match cli::parse_command(&line) {
            Ok(c) => c,
            Err(e) => {
                println!("! {}", e.user_message());
                continue;
            }
        };
        if cmd == Command::Quit {
            break;
        }
        if let Err(e) = run(&session, cmd, &mut hint).await {
            println!("! {}", e.user_message());
        }
    }
    Ok(())
}

async fn current(session: &Session) -> Result<Uuid, MealError> {
    session
        .latest_open()
        .await
        .map(|m| m.id)
        .ok_or_else(|| MealError::validation("nothing to work on yet, tell me what you ate"))
}

async fn show(session: &Session, id: Uuid) {
    match session.message(id).await.and_then(|m| m.pending_meal) {
        Some(meal) => print!("{}", cli::render_pending(&meal)),
        None => println!("(waiting for /analyze)"),
    }
}

async fn analyze(session: &Session, id: Uuid) -> Result<(), MealError> {
    println!("Processing...");
    session.request_analysis(id).await?;
    if let Some(text) = session.review_text(id).await {
        println!("{}", text);
    }
    show(session, id).await;
    Ok(())
}

fn local_offset() -> UtcOffset {
    local_now().offset()
}

async fn run(session: &Session, cmd: Command, hint: &mut Option<MealType>) -> Result<(), MealError> {
    let gateway = session.state().gateway.clone();
    let cfg = session.state().config.clone();

    match cmd {
        Command::Say(text) => {
            let id = session.submit_utterance(&text, hint.take()).await?;
            if cfg.auto_analyze {
                analyze(session, id).await?;
            } else {
                println!("(noted; /analyze when ready)");
            }
        }
        Command::Analyze => analyze(session, current(session).await?).await?,
        Command::Hint(h) => {
            match session.latest_open().await {
                Some(m) if m.pending_meal.is_none() && !m.is_busy() => {
                    session.set_hint(m.id, h).await?
                }
                _ => *hint = h,
            }
            println!("hint: {}", h.map(|t| t.as_str()).unwrap_or("none"));
        }
        Command::Add { name, kcal } => {
            let id = current(session).await?;
            session.add_manual_item(id, &name, kcal).await?;
            show(session, id).await;
        }
        Command::Accept(i) => {
            let id = current(session).await?;
            session.accept_suggestion(id, i).await?;
            show(session, id).await;
        }
        Command::Remove(i) => {
            let id = current(session).await?;
            session.remove_item(id, i).await?;
            show(session, id).await;
        }
        Command::Type(t) => {
            let id = current(session).await?;
            session.change_meal_type(id, t).await?;
            show(session, id).await;
        }
        Command::Time(at) => {
            let id = current(session).await?;
            session.change_eaten_at(id, at).await?;
            show(session, id).await;
        }
        Command::Save => {
            let id = current(session).await?;
            session.confirm_and_save(id).await?;
            if let Some(last) = session.messages().await.pop() {
                println!("{}", last.content);
            }
        }
        Command::Cancel => {
            session.cancel(current(session).await?).await?;
            if let Some(last) = session.messages().await.pop() {
                println!("{}", last.content);
            }
        }
        Command::Retry => {
            let draft = session.retry(current(session).await?).await?;
            *hint = draft.meal_type_hint;
            println!("edit and send again: {}", draft.text);
        }
        Command::Show => show(session, current(session).await?).await,
        Command::Today => {
            let records = gateway.list_recent(1000).await?;
            let offset = local_offset();
            let today = OffsetDateTime::now_utc().to_offset(offset).date();
            let summary = stats::daily_summary(&records, today, offset);
            println!("{}", cli::render_day(&summary, cfg.daily_goal_kcal));
        }
        Command::Week => {
            let offset = local_offset();
            let today = OffsetDateTime::now_utc().to_offset(offset).date();
            let records = gateway
                .list_range(stats::week_start(today), stats::week_end(today))
                .await?;
            let chart = stats::weekly_chart(&records, today, offset);
            let summary = stats::period_stats(&chart, 7);
            let note = stats::coach_note(summary.daily_avg_kcal);
            println!("{}", cli::render_chart(&chart, &summary, note));
        }
        Command::Month => {
            let offset = local_offset();
            let today = OffsetDateTime::now_utc().to_offset(offset).date();
            let (start, end) = stats::fetch_window(today);
            let records = gateway.list_range(start, end).await?;
            println!("{}", cli::render_calendar(&stats::stamp_calendar(&records, today, offset)));
            let chart = stats::monthly_chart(&records, today, offset);
            let summary =
                stats::period_stats(&chart, stats::days_in_month(today.year(), today.month()));
            let note = stats::coach_note(summary.daily_avg_kcal);
            println!("{}", cli::render_chart(&chart, &summary, note));
        }
        Command::Delete(id) => {
            gateway.delete(id).await?;
            println!("deleted #{}", id);
        }
        Command::Copy { id, date } => {
            let now = local_now();
            let at = copy_eaten_at(date.unwrap_or(now.date()), now);
            let copy = gateway.duplicate(id, at).await?;
            println!("copied #{} as #{}", id, copy.id);
        }
        Command::Help => println!("{}", cli::HELP),
        Command::Quit => {}
    }
    Ok(())
}
