//! Terminal event polling: crossterm events → logical keys.

use core_keymap::{Key, KeyCode, ModMask};
use core_pipeline::Scope;
use crossterm::event::{
    Event as CEvent, EventStream, KeyCode as CKeyCode, KeyEvent as CKeyEvent,
    KeyEventKind as CKeyEventKind, KeyModifiers as CKeyModifiers,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermEvent {
    Key(Key),
    Resize(u16, u16),
}

/// Spawn the polling task. It forwards until the scope cancels, the
/// consumer hangs up, or the event stream ends.
pub fn spawn_event_task(tx: mpsc::Sender<TermEvent>, scope: Scope) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = EventStream::new();
        loop {
            tokio::select! {
                _ = scope.cancelled() => {
                    debug!(target: "input.events", "stopped: scope cancelled");
                    break;
                }
                event = stream.next() => match event {
                    Some(Ok(event)) => {
                        if let Some(translated) = translate(&event) {
                            trace!(target: "input.events", ?translated, "event");
                            if tx.send(translated).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Err(err)) => {
                        debug!(target: "input.events", %err, "stopped: stream error");
                        break;
                    }
                    None => {
                        debug!(target: "input.events", "stopped: stream ended");
                        break;
                    }
                },
            }
        }
    })
}

fn translate(event: &CEvent) -> Option<TermEvent> {
    match event {
        CEvent::Key(key) => translate_key(key).map(TermEvent::Key),
        CEvent::Resize(cols, rows) => Some(TermEvent::Resize(*cols, *rows)),
        _ => None,
    }
}

/// Map a crossterm key event onto the binding lexicon's key model.
///
/// Shift is already folded into the rune for printable keys, so the SHIFT
/// bit is kept only for named keys; unsupported keys map to `None`.
pub fn translate_key(event: &CKeyEvent) -> Option<Key> {
    if matches!(event.kind, CKeyEventKind::Release) {
        return None;
    }
    let (code, ch) = match event.code {
        CKeyCode::Char(c) => (KeyCode::Char, c),
        CKeyCode::Enter => (KeyCode::Enter, '\0'),
        CKeyCode::Esc => (KeyCode::Esc, '\0'),
        CKeyCode::Backspace => (KeyCode::Backspace, '\0'),
        CKeyCode::Tab | CKeyCode::BackTab => (KeyCode::Tab, '\0'),
        CKeyCode::Up => (KeyCode::Up, '\0'),
        CKeyCode::Down => (KeyCode::Down, '\0'),
        CKeyCode::Left => (KeyCode::Left, '\0'),
        CKeyCode::Right => (KeyCode::Right, '\0'),
        CKeyCode::Home => (KeyCode::Home, '\0'),
        CKeyCode::End => (KeyCode::End, '\0'),
        CKeyCode::PageUp => (KeyCode::PageUp, '\0'),
        CKeyCode::PageDown => (KeyCode::PageDown, '\0'),
        CKeyCode::Insert => (KeyCode::Insert, '\0'),
        CKeyCode::Delete => (KeyCode::Delete, '\0'),
        CKeyCode::F(n) => (KeyCode::F(n), '\0'),
        _ => return None,
    };
    let mut mods = ModMask::empty();
    if event.modifiers.contains(CKeyModifiers::CONTROL) {
        mods |= ModMask::CTRL;
    }
    if event.modifiers.contains(CKeyModifiers::ALT) {
        mods |= ModMask::ALT;
    }
    if event.modifiers.contains(CKeyModifiers::SHIFT) && code != KeyCode::Char {
        mods |= ModMask::SHIFT;
    }
    Some(Key { mods, code, ch })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;
    use pretty_assertions::assert_eq;

    fn key_event(code: CKeyCode, modifiers: CKeyModifiers) -> CKeyEvent {
        CKeyEvent {
            code,
            modifiers,
            kind: CKeyEventKind::Press,
            state: KeyEventState::empty(),
        }
    }

    #[test]
    fn plain_char_maps_to_rune_key() {
        let key = translate_key(&key_event(CKeyCode::Char('a'), CKeyModifiers::NONE)).unwrap();
        assert_eq!(key, Key::char('a'));
    }

    #[test]
    fn ctrl_char_keeps_control_bit() {
        let key = translate_key(&key_event(CKeyCode::Char('x'), CKeyModifiers::CONTROL)).unwrap();
        assert_eq!(key, Key::ctrl('x'));
    }

    #[test]
    fn shifted_char_drops_shift_bit() {
        let key = translate_key(&key_event(CKeyCode::Char('A'), CKeyModifiers::SHIFT)).unwrap();
        assert_eq!(key, Key::char('A'));
    }

    #[test]
    fn named_keys_keep_shift_bit() {
        let key = translate_key(&key_event(CKeyCode::Tab, CKeyModifiers::SHIFT)).unwrap();
        assert_eq!(key, Key::named(KeyCode::Tab).with_mods(ModMask::SHIFT));
    }

    #[test]
    fn release_events_are_ignored() {
        let mut ev = key_event(CKeyCode::Char('a'), CKeyModifiers::NONE);
        ev.kind = CKeyEventKind::Release;
        assert!(translate_key(&ev).is_none());
    }

    #[test]
    fn media_keys_are_unsupported() {
        assert!(translate_key(&key_event(CKeyCode::CapsLock, CKeyModifiers::NONE)).is_none());
    }
}
