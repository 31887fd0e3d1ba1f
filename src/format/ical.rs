//! iCalendar (RFC 5545) export of calendar events.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::database::models::CalendarEvent;

const MAX_LINE_OCTETS: usize = 75;
const PRODID: &str = "-//TenderDesk//Calendar Export//FR";

/// Escape a TEXT value: backslash, semicolon, comma and newlines
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\\n");
            }
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Append `line` folded at 75 octets, never splitting a UTF-8 sequence
fn push_folded(out: &mut String, line: &str) {
    let mut used = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if used + len > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            used = 1;
        }
        out.push(ch);
        used += len;
    }
    out.push_str("\r\n");
}

fn format_datetime(value: DateTime<Utc>) -> String {
    value.format("%Y%m%dT%H%M%SZ").to_string()
}

fn format_date(value: NaiveDate) -> String {
    value.format("%Y%m%d").to_string()
}

fn push_event(out: &mut String, event: &CalendarEvent, stamp: &str) {
    push_folded(out, "BEGIN:VEVENT");
    push_folded(out, &format!("UID:{}@tenderdesk", event.id));
    push_folded(out, &format!("DTSTAMP:{}", stamp));

    if event.all_day {
        let start = event.start_at.date_naive();
        let end = event
            .end_at
            .map(|e| e.date_naive())
            .filter(|e| *e > start)
            .unwrap_or(start + Duration::days(1));
        push_folded(out, &format!("DTSTART;VALUE=DATE:{}", format_date(start)));
        push_folded(out, &format!("DTEND;VALUE=DATE:{}", format_date(end)));
    } else {
        let end = event.end_at.unwrap_or(event.start_at + Duration::hours(1));
        push_folded(out, &format!("DTSTART:{}", format_datetime(event.start_at)));
        push_folded(out, &format!("DTEND:{}", format_datetime(end)));
    }

    push_folded(out, &format!("SUMMARY:{}", escape_text(&event.title)));
    if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
        push_folded(out, &format!("DESCRIPTION:{}", escape_text(description)));
    }
    if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
        push_folded(out, &format!("LOCATION:{}", escape_text(location)));
    }
    push_folded(out, &format!("CATEGORIES:{}", escape_text(&event.event_type)));

    if let Some(minutes) = event.reminder_minutes.filter(|m| *m > 0) {
        push_folded(out, "BEGIN:VALARM");
        push_folded(out, "ACTION:DISPLAY");
        push_folded(out, &format!("DESCRIPTION:{}", escape_text(&event.title)));
        push_folded(out, &format!("TRIGGER:-PT{}M", minutes));
        push_folded(out, "END:VALARM");
    }

    push_folded(out, "END:VEVENT");
}

/// Render a complete `VCALENDAR` with one `VEVENT` per event
pub fn events_to_ics(events: &[CalendarEvent], calendar_name: &str, now: DateTime<Utc>) -> String {
    let stamp = format_datetime(now);
    let mut out = String::new();

    push_folded(&mut out, "BEGIN:VCALENDAR");
    push_folded(&mut out, "VERSION:2.0");
    push_folded(&mut out, &format!("PRODID:{}", PRODID));
    push_folded(&mut out, "CALSCALE:GREGORIAN");
    push_folded(&mut out, "METHOD:PUBLISH");
    push_folded(&mut out, &format!("X-WR-CALNAME:{}", escape_text(calendar_name)));

    for event in events {
        push_event(&mut out, event, &stamp);
    }

    push_folded(&mut out, "END:VCALENDAR");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn event(title: &str) -> CalendarEvent {
        let start = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        CalendarEvent {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            tender_id: None,
            title: title.to_string(),
            description: None,
            location: None,
            event_type: "deadline".to_string(),
            start_at: start,
            end_at: None,
            all_day: false,
            reminder_minutes: None,
            external_id: None,
            created_by: Uuid::new_v4(),
            created_at: start,
            updated_at: start,
        }
    }

    fn unfold(ics: &str) -> String {
        ics.replace("\r\n ", "")
    }

    #[test]
    fn one_vevent_per_event() {
        let ics = events_to_ics(&[event("A"), event("B"), event("C")], "Equipe", Utc::now());
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 3);
        assert_eq!(ics.matches("END:VEVENT").count(), 3);
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert!(ics.contains("CALSCALE:GREGORIAN\r\n"));
        assert!(ics.contains("METHOD:PUBLISH\r\n"));
    }

    #[test]
    fn end_defaults_to_one_hour_after_start() {
        let ics = events_to_ics(&[event("Réunion")], "x", Utc::now());
        assert!(ics.contains("DTSTART:20250314T093000Z\r\n"));
        assert!(ics.contains("DTEND:20250314T103000Z\r\n"));
    }

    #[test]
    fn all_day_uses_date_values() {
        let mut e = event("Dépôt");
        e.all_day = true;
        let ics = events_to_ics(&[e], "x", Utc::now());
        assert!(ics.contains("DTSTART;VALUE=DATE:20250314\r\n"));
        assert!(ics.contains("DTEND;VALUE=DATE:20250315\r\n"));
    }

    #[test]
    fn text_values_are_escaped() {
        assert_eq!(escape_text("a,b;c\\d\ne"), "a\\,b\\;c\\\\d\\ne");
        assert_eq!(escape_text("line\r\nnext"), "line\\nnext");

        let mut e = event("Lot 1, voirie; phase\\2");
        e.description = Some("Ligne 1\nLigne 2".to_string());
        let ics = unfold(&events_to_ics(&[e], "x", Utc::now()));
        assert!(ics.contains("SUMMARY:Lot 1\\, voirie\\; phase\\\\2\r\n"));
        assert!(ics.contains("DESCRIPTION:Ligne 1\\nLigne 2\r\n"));
    }

    #[test]
    fn long_lines_fold_at_75_octets() {
        let title = "é".repeat(100);
        let ics = events_to_ics(&[event(&title)], "x", Utc::now());
        for line in ics.split("\r\n") {
            assert!(line.len() <= MAX_LINE_OCTETS, "line too long: {}", line.len());
        }
        assert!(unfold(&ics).contains(&format!("SUMMARY:{}\r\n", title)));
    }

    #[test]
    fn reminder_adds_alarm() {
        let mut e = event("Visite");
        e.reminder_minutes = Some(30);
        let ics = events_to_ics(&[e, event("Sans rappel")], "x", Utc::now());
        assert_eq!(ics.matches("BEGIN:VALARM").count(), 1);
        assert!(ics.contains("TRIGGER:-PT30M\r\n"));
        assert!(ics.contains("ACTION:DISPLAY\r\n"));
    }
}
