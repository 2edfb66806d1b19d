use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use takeover_core::models::TabId;
use takeover_core::{TakeoverController, TakeoverRuntime, UiEvent};

use super::commands::print_json;

/// One line typed into `takeover run`, acting on the virtual browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageInput {
    Overlays,
    Open(String),
    Close(TabId),
    Event(TabId, UiEvent),
    Test,
    Quit,
}

pub const PAGE_INPUT_HELP: &str = "commands: overlays | open <url> | close <tab> | dismiss <tab> | \
snooze <tab> | key <tab> <key> | backdrop <tab> | hide <tab> | show <tab> | navigate <tab> | \
unload <tab> | test | quit";

pub fn parse_page_input(line: &str) -> Result<PageInput, String> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Err("empty input".to_string());
    };

    let input = match word {
        "overlays" => PageInput::Overlays,
        "test" => PageInput::Test,
        "quit" | "exit" => PageInput::Quit,
        "close" => PageInput::Close(tab_arg(&mut parts, word)?),
        "dismiss" => PageInput::Event(tab_arg(&mut parts, word)?, UiEvent::DismissClicked),
        "snooze" => PageInput::Event(tab_arg(&mut parts, word)?, UiEvent::SnoozeClicked),
        "backdrop" => PageInput::Event(tab_arg(&mut parts, word)?, UiEvent::BackdropClicked),
        "hide" => PageInput::Event(
            tab_arg(&mut parts, word)?,
            UiEvent::VisibilityChanged { visible: false },
        ),
        "show" => PageInput::Event(
            tab_arg(&mut parts, word)?,
            UiEvent::VisibilityChanged { visible: true },
        ),
        "navigate" => PageInput::Event(tab_arg(&mut parts, word)?, UiEvent::Navigation),
        "unload" => PageInput::Event(tab_arg(&mut parts, word)?, UiEvent::PageUnload),
        "key" => {
            let tab = tab_arg(&mut parts, word)?;
            let key = parts.next().ok_or("key needs a key name")?;
            PageInput::Event(tab, UiEvent::Key(key.to_string()))
        }
        "open" => {
            let url = parts.next().ok_or("open needs a url")?;
            PageInput::Open(url.to_string())
        }
        other => return Err(format!("unknown command '{}'", other)),
    };
    Ok(input)
}

fn tab_arg<'a>(parts: &mut impl Iterator<Item = &'a str>, word: &str) -> Result<TabId, String> {
    parts
        .next()
        .ok_or_else(|| format!("{} needs a tab id", word))?
        .parse::<u32>()
        .map(TabId)
        .map_err(|_| format!("{} needs a numeric tab id", word))
}

/// Host the controller until ctrl-c or `quit`: fired alarms drive
/// deliveries, stdin lines act on the virtual tabs, and alarms are
/// periodically reconciled with the store.
pub async fn run_daemon(
    mut runtime: TakeoverRuntime,
    pretty: bool,
    reconcile_every: Duration,
) -> Result<()> {
    eprintln!("Starting takeover controller...");
    let mut fired = runtime
        .take_fired_alarms()
        .context("Alarm channel already taken")?;

    match runtime.controller().restore_alarms().await {
        Ok(summary) => eprintln!(
            "Alarms restored ({} armed, {} cancelled)",
            summary.armed, summary.cancelled
        ),
        Err(e) => warn!("Failed to restore alarms: {}", e),
    }
    eprintln!("Data directory: {}", runtime.config().data_dir.display());
    eprintln!("{}", PAGE_INPUT_HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let mut reconcile = tokio::time::interval(reconcile_every);
    // The first tick completes immediately and restore_alarms just ran
    reconcile.tick().await;

    loop {
        tokio::select! {
            Some(name) = fired.recv() => {
                spawn_alarm(runtime.controller().clone(), name, pretty);
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match parse_page_input(&line) {
                        Ok(PageInput::Quit) => break,
                        Ok(input) => apply_input(&runtime, input, pretty),
                        Err(message) => eprintln!("{} ({})", message, PAGE_INPUT_HELP),
                    },
                    Ok(None) => {
                        debug!("stdin closed");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = reconcile.tick() => {
                if let Err(e) = runtime.controller().restore_alarms().await {
                    warn!("Alarm reconciliation failed: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Interrupted");
                break;
            }
        }
    }

    info!("Controller stopped");
    Ok(())
}

fn spawn_alarm(controller: Arc<TakeoverController>, name: String, pretty: bool) {
    tokio::spawn(async move {
        let Some(report) = controller.handle_alarm(&name).await else {
            return;
        };
        let event = json!({ "event": "takeover", "alarm": name, "report": report });
        if let Err(e) = print_json(&event, pretty) {
            warn!("Failed to print delivery report: {}", e);
        }
    });
}

fn apply_input(runtime: &TakeoverRuntime, input: PageInput, pretty: bool) {
    let browser = runtime.browser();
    let event = match input {
        PageInput::Overlays => {
            let overlays: Vec<_> = browser
                .visible_overlays()
                .into_iter()
                .map(|(tab, view)| json!({ "tab": tab, "overlay": view }))
                .collect();
            json!({ "event": "overlays", "overlays": overlays })
        }
        PageInput::Open(url) => {
            let tab = browser.open_tab(url.clone());
            json!({ "event": "tab-opened", "tab": tab, "url": url })
        }
        PageInput::Close(tab) => {
            json!({ "event": "tab-closed", "tab": tab, "found": browser.close_tab(tab) })
        }
        PageInput::Event(tab, ui_event) => {
            let delivered = browser.dispatch(tab, ui_event);
            json!({ "event": "page-event", "tab": tab, "delivered": delivered })
        }
        PageInput::Test => {
            let control = runtime.control();
            tokio::spawn(async move {
                let ack = control.trigger_test().await;
                if !ack.success {
                    warn!("Test takeover failed: {:?}", ack.error);
                }
            });
            return;
        }
        PageInput::Quit => return,
    };
    if let Err(e) = print_json(&event, pretty) {
        warn!("Failed to print event: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_events() {
        assert_eq!(
            parse_page_input("dismiss 3").unwrap(),
            PageInput::Event(TabId(3), UiEvent::DismissClicked)
        );
        assert_eq!(
            parse_page_input("  key 2 Escape ").unwrap(),
            PageInput::Event(TabId(2), UiEvent::Key("Escape".into()))
        );
        assert_eq!(
            parse_page_input("hide 1").unwrap(),
            PageInput::Event(TabId(1), UiEvent::VisibilityChanged { visible: false })
        );
        assert_eq!(
            parse_page_input("open https://example.org/").unwrap(),
            PageInput::Open("https://example.org/".into())
        );
        assert_eq!(parse_page_input("close 4").unwrap(), PageInput::Close(TabId(4)));
        assert_eq!(parse_page_input("exit").unwrap(), PageInput::Quit);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_page_input("").is_err());
        assert!(parse_page_input("dismiss").is_err());
        assert!(parse_page_input("snooze abc").is_err());
        assert!(parse_page_input("key 1").is_err());
        assert_eq!(
            parse_page_input("reload 1").unwrap_err(),
            "unknown command 'reload'"
        );
    }
}
