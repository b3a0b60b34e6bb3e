//! Line commands accepted on stdin.
//!
//! ```text
//! status                     show connection state and display scale
//! reconnect                  tear down and connect again
//! screenshot                 capture a thumbnail now
//! fullscreen                 toggle fullscreen
//! cad                        send Ctrl-Alt-Del
//! key <keysym>               press and release one key (decimal or 0x hex)
//! type <text>                type ASCII text
//! click <x> <y>              left click at viewport coordinates
//! scale <factor>|fit         manual zoom, or back to fit-to-viewport
//! resize <w> <h>             resize the host container
//! focus                      focus the host window (clipboard resync)
//! copy <text>                copy text on the host
//! remote-copy <text>         copy text inside the remote session
//! clipboard                  show the latest clipboard value
//! fault <code>               simulate a tunnel error with a status code
//! unstable on|off            simulate tunnel instability
//! quit                       disconnect and exit
//! ```

/// A parsed stdin command.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Status,
    Reconnect,
    Screenshot,
    Fullscreen,
    CtrlAltDel,
    Key(u32),
    Type(String),
    Click(f64, f64),
    Scale(Option<f64>),
    Resize(f64, f64),
    Focus,
    Copy(String),
    RemoteCopy(String),
    Clipboard,
    Fault(u16),
    Unstable(bool),
    Quit,
}

/// Parse one input line.
pub fn parse_command(input: &str) -> Result<ConsoleCommand, String> {
    let input = input.trim();
    let (word, rest) = match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    };

    match word {
        "status" => Ok(ConsoleCommand::Status),
        "reconnect" => Ok(ConsoleCommand::Reconnect),
        "screenshot" => Ok(ConsoleCommand::Screenshot),
        "fullscreen" => Ok(ConsoleCommand::Fullscreen),
        "cad" => Ok(ConsoleCommand::CtrlAltDel),
        "focus" => Ok(ConsoleCommand::Focus),
        "clipboard" => Ok(ConsoleCommand::Clipboard),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        "key" => parse_u32(rest)
            .map(ConsoleCommand::Key)
            .ok_or_else(|| "key requires a keysym".to_string()),
        "type" => required(rest, "type requires text").map(ConsoleCommand::Type),
        "copy" => required(rest, "copy requires text").map(ConsoleCommand::Copy),
        "remote-copy" => required(rest, "remote-copy requires text").map(ConsoleCommand::RemoteCopy),
        "click" => parse_pair(rest)
            .map(|(x, y)| ConsoleCommand::Click(x, y))
            .ok_or_else(|| "click requires <x> <y>".to_string()),
        "resize" => parse_pair(rest)
            .map(|(w, h)| ConsoleCommand::Resize(w, h))
            .ok_or_else(|| "resize requires <w> <h>".to_string()),
        "scale" => match rest {
            "fit" => Ok(ConsoleCommand::Scale(None)),
            factor => factor
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite() && *f > 0.0)
                .map(|f| ConsoleCommand::Scale(Some(f)))
                .ok_or_else(|| "scale requires a positive factor or 'fit'".to_string()),
        },
        "fault" => parse_u32(rest)
            .and_then(|code| u16::try_from(code).ok())
            .map(ConsoleCommand::Fault)
            .ok_or_else(|| "fault requires a status code".to_string()),
        "unstable" => match rest {
            "on" => Ok(ConsoleCommand::Unstable(true)),
            "off" => Ok(ConsoleCommand::Unstable(false)),
            _ => Err("unstable requires on|off".to_string()),
        },
        _ => Err(format!("Unknown command: '{input}'")),
    }
}

fn required(arg: &str, message: &str) -> Result<String, String> {
    if arg.is_empty() {
        Err(message.to_string())
    } else {
        Ok(arg.to_string())
    }
}

fn parse_u32(arg: &str) -> Option<u32> {
    match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => arg.parse().ok(),
    }
}

fn parse_pair(arg: &str) -> Option<(f64, f64)> {
    let mut parts = arg.split_whitespace();
    let a = parts.next()?.parse().ok()?;
    let b = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((a, b))
}
