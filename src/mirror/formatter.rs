use crate::feed::{Impact, Incident, IncidentUpdate, parse_feed_timestamp};
use crate::webhook::Embed;
use chrono::SecondsFormat;

pub const COLOR_GREEN: u32 = 0x3B_A5_5D;
pub const COLOR_RED: u32 = 0xED_42_45;
pub const COLOR_ORANGE: u32 = 0xE6_7E_22;
pub const COLOR_YELLOW: u32 = 0xFE_E7_5C;
pub const COLOR_BLACK: u32 = 0x23_27_2A;

/// Terminal incidents are green regardless of impact.
pub fn incident_color(incident: &Incident) -> u32 {
    if incident.status.is_terminal() {
        return COLOR_GREEN;
    }
    match incident.impact {
        Impact::Critical => COLOR_RED,
        Impact::Major => COLOR_ORANGE,
        Impact::Minor => COLOR_YELLOW,
        Impact::None | Impact::Unknown => COLOR_BLACK,
    }
}

/// Renders an incident as a webhook embed.
///
/// The feed lists updates newest first; fields are emitted oldest first so
/// the message reads as a timeline.
pub fn embed_from_incident(incident: &Incident) -> Embed {
    let mut embed = Embed::new()
        .color(incident_color(incident))
        .timestamp(
            incident
                .started_time()
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        )
        .url(incident.shortlink.clone())
        .title(incident.name.as_str())
        .footer(incident.id.as_str());

    for update in incident.incident_updates.iter().rev() {
        embed.push_field(&update_label(update), &update.body);
    }

    let mut description = vec![format!("• Impact: {}", incident.impact)];
    if !incident.components.is_empty() {
        let names: Vec<&str> = incident
            .components
            .iter()
            .map(|component| component.name.as_str())
            .collect();
        description.push(format!("• Affected Components: {}", names.join(", ")));
    }

    embed.description(description.join("\n"))
}

/// `Investigating (<t:1709316000:R>)`; the marker is left out when the
/// update's timestamp does not parse.
fn update_label(update: &IncidentUpdate) -> String {
    let status = capitalize(&update.status);
    match parse_feed_timestamp(&update.created_at) {
        Some(created) => format!("{status} (<t:{}:R>)", created.timestamp()),
        None => status,
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Component, IncidentStatus};

    fn update(status: &str, body: &str, created_at: &str) -> IncidentUpdate {
        IncidentUpdate {
            status: status.into(),
            body: body.into(),
            created_at: created_at.into(),
        }
    }

    fn incident(status: IncidentStatus, impact: Impact) -> Incident {
        Incident {
            id: "p7b5cjxvr2lx".into(),
            name: "Elevated API errors".into(),
            shortlink: Some("https://stspg.io/p7b5cjxvr2lx".into()),
            impact,
            status,
            started_at: Some("2024-03-01T18:00:00Z".into()),
            created_at: "2024-03-01T18:01:00Z".into(),
            updated_at: None,
            components: vec![],
            incident_updates: vec![update(
                "investigating",
                "We are looking into elevated error rates.",
                "2024-03-01T18:00:00Z",
            )],
        }
    }

    #[test]
    fn color_precedence() {
        assert_eq!(
            incident_color(&incident(IncidentStatus::Investigating, Impact::Critical)),
            COLOR_RED
        );
        assert_eq!(
            incident_color(&incident(IncidentStatus::Identified, Impact::Major)),
            COLOR_ORANGE
        );
        assert_eq!(
            incident_color(&incident(IncidentStatus::Monitoring, Impact::Minor)),
            COLOR_YELLOW
        );
        assert_eq!(
            incident_color(&incident(IncidentStatus::Investigating, Impact::None)),
            COLOR_BLACK
        );
        assert_eq!(
            incident_color(&incident(IncidentStatus::Resolved, Impact::Critical)),
            COLOR_GREEN
        );
        assert_eq!(
            incident_color(&incident(IncidentStatus::Postmortem, Impact::Major)),
            COLOR_GREEN
        );
    }

    #[test]
    fn critical_investigating_renders_single_field() {
        let embed = embed_from_incident(&incident(IncidentStatus::Investigating, Impact::Critical));

        assert_eq!(embed.color, Some(COLOR_RED));
        assert_eq!(embed.title.as_deref(), Some("Elevated API errors"));
        assert_eq!(embed.url.as_deref(), Some("https://stspg.io/p7b5cjxvr2lx"));
        assert_eq!(embed.footer.as_ref().unwrap().text, "p7b5cjxvr2lx");
        assert_eq!(embed.timestamp.as_deref(), Some("2024-03-01T18:00:00.000Z"));
        assert_eq!(embed.fields.len(), 1);
        assert_eq!(embed.fields[0].name, "Investigating (<t:1709316000:R>)");
        assert_eq!(
            embed.fields[0].value,
            "We are looking into elevated error rates."
        );
        assert_eq!(embed.description.as_deref(), Some("• Impact: critical"));
    }

    #[test]
    fn updates_render_oldest_first() {
        let mut inc = incident(IncidentStatus::Resolved, Impact::Minor);
        inc.incident_updates = vec![
            update("resolved", "All clear.", "2024-03-01T19:00:00Z"),
            update("identified", "Found it.", "2024-03-01T18:30:00Z"),
            update("investigating", "Looking.", "2024-03-01T18:00:00Z"),
        ];

        let embed = embed_from_incident(&inc);
        let bodies: Vec<_> = embed.fields.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(bodies, ["Looking.", "Found it.", "All clear."]);
        assert!(embed.fields[2].name.starts_with("Resolved ("));
    }

    #[test]
    fn affected_components_line_only_when_present() {
        let mut inc = incident(IncidentStatus::Identified, Impact::Major);
        inc.components = vec![
            Component { name: "API".into() },
            Component {
                name: "Voice".into(),
            },
        ];

        let embed = embed_from_incident(&inc);
        assert_eq!(
            embed.description.as_deref(),
            Some("• Impact: major\n• Affected Components: API, Voice")
        );
    }

    #[test]
    fn unparseable_update_time_drops_marker() {
        let mut inc = incident(IncidentStatus::Monitoring, Impact::Minor);
        inc.incident_updates = vec![update("monitoring", "Watching.", "soon")];

        let embed = embed_from_incident(&inc);
        assert_eq!(embed.fields[0].name, "Monitoring");
    }

    #[test]
    fn timestamp_falls_back_to_created_at() {
        let mut inc = incident(IncidentStatus::Monitoring, Impact::Minor);
        inc.started_at = None;

        let embed = embed_from_incident(&inc);
        assert_eq!(embed.timestamp.as_deref(), Some("2024-03-01T18:01:00.000Z"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let inc = incident(IncidentStatus::Investigating, Impact::Critical);
        assert_eq!(embed_from_incident(&inc), embed_from_incident(&inc));
    }

    #[test]
    fn capitalize_handles_empty_and_unicode() {
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("résolu"), "Résolu");
        assert_eq!(capitalize("in_progress"), "In_progress");
    }
}
