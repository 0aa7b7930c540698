//! Terminal front end for scenarios and practice lessons.

use std::io::{BufRead, Write};

use services::{ActiveScenario, Lesson, LessonService, NodeView, PlayerError, ScenarioPlayer};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const QUIT: &str = ":q";

/// What the learner typed at a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Quit,
    Text(String),
}

fn read_reply(input: &mut impl BufRead, out: &mut impl Write, prompt: &str) -> CliResult<Reply> {
    write!(out, "{prompt}")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(Reply::Quit);
    }
    let line = line.trim();
    if line == QUIT {
        return Ok(Reply::Quit);
    }
    Ok(Reply::Text(line.to_owned()))
}

/// Map a typed reply onto an option value: a 1-based number picks from the
/// displayed list, anything else is taken verbatim.
fn resolve_option(view: &NodeView, reply: &str) -> String {
    let Some(question) = view.question.as_ref() else {
        return reply.to_owned();
    };
    reply
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|idx| question.options.get(idx))
        .map_or_else(|| reply.to_owned(), |o| o.value.clone())
}

fn render(view: &NodeView, out: &mut impl Write) -> CliResult<()> {
    writeln!(out)?;
    writeln!(out, "[{}% | score {}]", view.percent_complete, view.score)?;
    writeln!(out, "{}", view.content)?;
    if let Some(question) = view.question.as_ref() {
        writeln!(out, "{}", question.prompt)?;
        for (idx, option) in question.options.iter().enumerate() {
            writeln!(out, "  {}. {}", idx + 1, option.text)?;
        }
    }
    Ok(())
}

/// Walk `active` until it completes or the learner quits.
pub async fn run_scenario(
    player: &ScenarioPlayer,
    active: &mut ActiveScenario,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> CliResult<()> {
    while active.is_active() {
        let view = player.present(active)?;
        render(&view, out)?;

        if view.is_terminal {
            player.continue_on(active).await?;
            continue;
        }

        if view.question.is_some() {
            let Reply::Text(reply) = read_reply(input, out, "answer> ")? else {
                player.exit(active).await?;
                break;
            };
            let answer = resolve_option(&view, &reply);
            match player.submit_answer(active, Some(&answer)).await {
                Ok(result) => {
                    let verdict = if result.evaluation.correct {
                        "Correct!"
                    } else {
                        "Not quite."
                    };
                    writeln!(out, "{verdict}")?;
                    if let Some(explanation) = result.evaluation.explanation {
                        writeln!(out, "{explanation}")?;
                    }
                    if let Err(err) = result.transition {
                        writeln!(out, "Content issue, staying here: {err}")?;
                    }
                }
                Err(PlayerError::Evaluation(err)) => writeln!(out, "{err}")?,
                Err(err) => return Err(err.into()),
            }
            continue;
        }

        let branches: Vec<&String> = view.outcomes.iter().filter(|o| *o != "next").collect();
        if branches.is_empty() {
            if read_reply(input, out, "(enter to continue) ")? == Reply::Quit {
                player.exit(active).await?;
                break;
            }
            player.continue_on(active).await?;
            continue;
        }

        for (idx, branch) in branches.iter().enumerate() {
            writeln!(out, "  {}. {branch}", idx + 1)?;
        }
        let Reply::Text(reply) = read_reply(input, out, "choose> ")? else {
            player.exit(active).await?;
            break;
        };
        let key = reply
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| branches.get(idx))
            .map_or(reply.clone(), |b| (*b).clone());
        player.choose(active, &key).await?;
    }

    let session = active.session();
    writeln!(
        out,
        "\nSession {}: {}% complete, score {}",
        session.status.as_str(),
        session.progress.percent_complete,
        session.score()
    )?;
    Ok(())
}

/// Run a practice lesson until every item is answered or the learner quits.
pub async fn run_lesson(
    lessons: &LessonService,
    lesson: &mut Lesson,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> CliResult<()> {
    while let Some(item) = lesson.current_item() {
        writeln!(
            out,
            "\n[{}/{} | {}] {}",
            item.question_index + 1,
            item.total_questions,
            item.difficulty,
            item.prompt
        )?;

        let mut hints_used = 0_u32;
        let answer = loop {
            let Reply::Text(reply) = read_reply(input, out, "answer (? for hint)> ")? else {
                break None;
            };
            if reply != "?" {
                break Some(reply);
            }
            match item.hints.get(hints_used as usize) {
                Some(hint) => {
                    hints_used += 1;
                    writeln!(out, "hint: {hint}")?;
                }
                None => writeln!(out, "no more hints")?,
            }
        };
        let Some(answer) = answer else {
            break;
        };

        let step = lessons.answer(lesson, &answer, hints_used).await?;
        if step.correct {
            writeln!(out, "Correct!")?;
        } else if let Some(expected) = step.expected {
            writeln!(out, "Not quite, expected {expected}")?;
        }
        if let Some(to) = step.adaptation.and_then(|d| d.new_difficulty) {
            writeln!(out, "Difficulty now {to}")?;
        }
    }

    let state = lesson.state();
    writeln!(
        out,
        "\nLesson score {}, accuracy {:.0}%, best streak {}",
        state.score,
        state.accuracy() * 100.0,
        state.best_streak
    )?;
    Ok(())
}
