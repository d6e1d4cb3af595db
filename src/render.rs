use crate::model::{Blacklist, BlacklistKind, PlaybackSnapshot};

/// The display surface. The poll loop never formats output itself, it only hands over state.
pub trait Renderer {
    fn render_playback(&mut self, snapshot: &PlaybackSnapshot, blacklist: &Blacklist);
    fn render_blacklist(&mut self, blacklist: &Blacklist);
}

/// Renders to the log. A change of the playing item is logged at info level, the same item on
/// subsequent ticks only at debug level.
#[derive(Default)]
pub struct LogRenderer {
    last_rendered: Option<PlaybackSnapshot>,
}

impl Renderer for LogRenderer {
    fn render_playback(&mut self, snapshot: &PlaybackSnapshot, _blacklist: &Blacklist) {
        let line = match snapshot {
            PlaybackSnapshot::Playing(item) => format!("{} [NOT BLOCKED]", item),
            PlaybackSnapshot::Empty => "No song currently playing".to_string(),
        };
        if self.last_rendered.as_ref() == Some(snapshot) {
            debug!("{}", line);
        } else {
            info!("{}", line);
            if let PlaybackSnapshot::Playing(item) = snapshot {
                if let Some(url) = &item.album_art_url {
                    debug!("Album art: {}", url);
                }
            }
            self.last_rendered = Some(snapshot.clone());
        }
    }

    fn render_blacklist(&mut self, blacklist: &Blacklist) {
        info!("{}", format_blacklist(blacklist));
    }
}

fn format_blacklist(blacklist: &Blacklist) -> String {
    if blacklist.is_empty() {
        return "Blacklist is empty.".to_string();
    }
    let mut lines = vec![format!("Blacklist ({} entries):", blacklist.len())];
    for kind in BlacklistKind::ALL {
        for entry in blacklist.entries(kind) {
            lines.push(format!("  {:<7} {} ({})", kind.as_str(), entry.name, entry.id));
        }
    }
    lines.join("\n")
}
