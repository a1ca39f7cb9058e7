//! The personal strengths report: collected stories plus self-reflections,
//! rendered to a PDF.
//!
//! Rendering is deterministic: the same input (including the generated-on
//! date, which the caller supplies) produces byte-identical output. The PDF
//! bytes are returned to the caller and never stored; only metadata about
//! the generation is recorded.

mod fonts;
mod layout;

use chrono::{DateTime, Utc};
use lopdf::content::Content;
use lopdf::{dictionary, Document, Object, Stream};

use crate::db::{DbReportMeta, DbSelfReflection, DbStoryWithTeller, SareDb};
use crate::error::SareError;
use crate::progress;
use crate::session::Session;

use fonts::Font;
use layout::{
    text_ops, PageComposer, CORAL, DARK_GRAY, LIGHT_GRAY, PAGE_HEIGHT, PAGE_WIDTH, TEAL,
};

const REPORT_TITLE: &str = "SARE PERSONAL STRENGTHS REPORT";
const FOOTER_BRAND: &str = "SARE - See Yourself at Your Best";
const INTRO_TEXT: &str = "This report contains stories about you at your best, collected from \
    people who know you well, along with your personal reflections. These insights reveal your \
    signature strengths and natural talents.";

/// One submitted story, ready for the report.
#[derive(Debug, Clone)]
pub struct ReportStory {
    pub storyteller_name: String,
    pub story_one: String,
    pub story_two: Option<String>,
    pub story_three: Option<String>,
}

impl From<DbStoryWithTeller> for ReportStory {
    fn from(story: DbStoryWithTeller) -> Self {
        ReportStory {
            storyteller_name: story.storyteller_name,
            story_one: story.story_one,
            story_two: story.story_two,
            story_three: story.story_three,
        }
    }
}

/// The reflection answers, keyed by the section they render under.
#[derive(Debug, Clone, Default)]
pub struct ReportReflection {
    /// "Peak Performance Moments"
    pub peak_moments: Option<String>,
    /// "Natural Talents & Energy"
    pub natural_talents: Option<String>,
    /// "Impact & Contribution"
    pub impact: Option<String>,
    /// "Personal Narrative", the optional free-form closer
    pub narrative: Option<String>,
}

impl From<DbSelfReflection> for ReportReflection {
    fn from(reflection: DbSelfReflection) -> Self {
        ReportReflection {
            peak_moments: reflection.evidence_response,
            natural_talents: reflection.strengths_response,
            impact: reflection.growth_themes_response,
            narrative: reflection.personal_narrative,
        }
    }
}

/// Everything the renderer needs. Pure data, no store access.
#[derive(Debug, Clone)]
pub struct ReportInput {
    pub user_email: String,
    /// Display date for the header, e.g. `8/25/2026`.
    pub generated_on: String,
    pub stories: Vec<ReportStory>,
    pub reflection: Option<ReportReflection>,
}

/// A rendered PDF.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// A generated report plus its recorded metadata.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub meta: DbReportMeta,
}

/// Render a report to PDF bytes. Pure: no clock, no store.
pub fn render_report(input: &ReportInput) -> Result<RenderedReport, SareError> {
    let mut c = PageComposer::new();

    // Header
    let y = c.y();
    c.draw_text(REPORT_TITLE, 50.0, y, 24.0, Font::HelveticaBold, TEAL);
    c.move_down(40.0);

    let y = c.y();
    c.draw_text(
        &format!("Generated for: {}", input.user_email),
        50.0,
        y,
        12.0,
        Font::Helvetica,
        LIGHT_GRAY,
    );
    c.draw_text(
        &format!("Date: {}", input.generated_on),
        400.0,
        y,
        12.0,
        Font::Helvetica,
        LIGHT_GRAY,
    );
    c.move_down(60.0);

    // Introduction
    let y = c.y();
    c.draw_text("Introduction", 50.0, y, 18.0, Font::HelveticaBold, TEAL);
    c.move_down(30.0);
    let intro_height = c.draw_wrapped(INTRO_TEXT, 50.0, 500.0, 12.0, Font::Helvetica);
    c.move_down(intro_height + 30.0);

    // Stories
    if !input.stories.is_empty() {
        c.ensure_space(60.0);
        let y = c.y();
        c.draw_text(
            &format!("Stories About You ({})", input.stories.len()),
            50.0,
            y,
            18.0,
            Font::HelveticaBold,
            TEAL,
        );
        c.move_down(40.0);

        for (index, story) in input.stories.iter().enumerate() {
            c.ensure_space(120.0);
            let y = c.y();
            c.draw_text(
                &format!("Story {}: From {}", index + 1, story.storyteller_name),
                50.0,
                y,
                14.0,
                Font::HelveticaBold,
                CORAL,
            );
            c.move_down(25.0);

            let parts = [
                ("Part 1", Some(story.story_one.as_str())),
                ("Part 2", story.story_two.as_deref()),
                ("Part 3", story.story_three.as_deref()),
            ];
            for (label, content) in parts {
                let Some(content) = content.filter(|s| !s.is_empty()) else {
                    continue;
                };
                c.ensure_space(50.0);
                let y = c.y();
                c.draw_text(
                    &format!("{label}:"),
                    70.0,
                    y,
                    12.0,
                    Font::HelveticaBold,
                    DARK_GRAY,
                );
                c.move_down(20.0);
                let part_height = c.draw_wrapped(content, 70.0, 480.0, 11.0, Font::Helvetica);
                c.move_down(part_height + 15.0);
            }

            c.move_down(20.0);
        }
    }

    // Self-reflections
    if let Some(reflection) = &input.reflection {
        c.ensure_space(60.0);
        let y = c.y();
        c.draw_text(
            "Your Self-Reflections",
            50.0,
            y,
            18.0,
            Font::HelveticaBold,
            TEAL,
        );
        c.move_down(40.0);

        let items = [
            (
                "Peak Performance Moments",
                "When you felt you were performing at your absolute best:",
                reflection.peak_moments.as_deref(),
            ),
            (
                "Natural Talents & Energy",
                "Activities that come naturally and give you energy:",
                reflection.natural_talents.as_deref(),
            ),
            (
                "Impact & Contribution",
                "How you contribute to teams and relationships:",
                reflection.impact.as_deref(),
            ),
            (
                "Personal Narrative",
                "Additional thoughts or insights you wanted to capture:",
                reflection.narrative.as_deref(),
            ),
        ];
        for (title, question, content) in items {
            let Some(content) = content.filter(|s| !s.is_empty()) else {
                continue;
            };
            c.ensure_space(100.0);
            let y = c.y();
            c.draw_text(title, 50.0, y, 14.0, Font::HelveticaBold, CORAL);
            c.move_down(25.0);
            let y = c.y();
            c.draw_text(question, 70.0, y, 11.0, Font::Helvetica, LIGHT_GRAY);
            c.move_down(20.0);
            let item_height = c.draw_wrapped(content, 70.0, 480.0, 11.0, Font::Helvetica);
            c.move_down(item_height + 25.0);
        }
    }

    // Footers go on last, once the total is known
    let mut pages = c.finish();
    let total = pages.len();
    for (i, ops) in pages.iter_mut().enumerate() {
        ops.extend(text_ops(
            FOOTER_BRAND,
            50.0,
            50.0,
            10.0,
            Font::Helvetica,
            LIGHT_GRAY,
        ));
        ops.extend(text_ops(
            &format!("Page {} of {}", i + 1, total),
            500.0,
            50.0,
            10.0,
            Font::Helvetica,
            LIGHT_GRAY,
        ));
    }

    let bytes = build_document(pages)?;
    Ok(RenderedReport {
        bytes,
        page_count: total,
    })
}

/// Assemble the final PDF from per-page content operations.
fn build_document(pages_ops: Vec<Vec<lopdf::content::Operation>>) -> Result<Vec<u8>, SareError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Font::Helvetica.base_name(),
    });
    let font_bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Font::HelveticaBold.base_name(),
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            Font::Helvetica.resource_tag() => font_regular,
            Font::HelveticaBold.resource_tag() => font_bold,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for ops in pages_ops {
        let content = Content { operations: ops };
        let encoded = content
            .encode()
            .map_err(|e| SareError::Render(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                (PAGE_WIDTH as i64).into(),
                (PAGE_HEIGHT as i64).into(),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| SareError::Render(e.to_string()))?;
    Ok(bytes)
}

/// Build and render the signed-in account's report from the store.
///
/// Gated twice: the report must be viewable (reflection finished, at least
/// one story) and must not have been locked. Regenerating an unlocked report
/// is allowed and refreshes the metadata.
pub fn generate_report(
    db: &SareDb,
    session: &Session,
    now: DateTime<Utc>,
) -> Result<GeneratedReport, SareError> {
    let account = session.require_account()?;
    let progress = progress::evaluate_for_account(db, session)?;
    if !progress.can_view_report {
        let reason = if !progress.reflection_completed {
            "the self-reflection is not finished"
        } else {
            "no stories have been submitted yet"
        };
        return Err(SareError::ReportNotReady(reason.to_string()));
    }
    if let Some(meta) = db.get_report_meta(&account.user_id)? {
        if meta.is_locked {
            return Err(SareError::ReportLocked);
        }
    }

    let profile = db
        .get_profile(&account.user_id)?
        .ok_or_else(|| SareError::NotFound(format!("Profile not found: {}", account.user_id)))?;
    // Oldest first, so the report reads in the order stories arrived
    let mut stories = db.list_stories_with_tellers(&account.user_id)?;
    stories.reverse();
    let story_count = stories.len() as i64;
    let reflection = db.get_reflection(&account.user_id)?;

    let input = ReportInput {
        user_email: profile.email,
        generated_on: now.format("%-m/%-d/%Y").to_string(),
        stories: stories.into_iter().map(ReportStory::from).collect(),
        reflection: reflection.map(ReportReflection::from),
    };
    let rendered = render_report(&input)?;

    let meta = db.upsert_report_meta(
        &account.user_id,
        now,
        rendered.page_count as i64,
        story_count,
    )?;
    log::info!(
        "Report: generated for {} ({} stories, {} pages)",
        account.user_id,
        story_count,
        rendered.page_count
    );

    Ok(GeneratedReport {
        bytes: rendered.bytes,
        filename: format!("SARE-Report-{}.pdf", now.format("%Y-%m-%d")),
        meta,
    })
}

/// Finalize the report so it can never be regenerated.
pub fn lock_report(db: &SareDb, session: &Session) -> Result<DbReportMeta, SareError> {
    let account = session.require_account()?;
    let meta = db.lock_report(&account.user_id)?;
    log::info!("Report: locked for {}", account.user_id);
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::test_utils::test_db;

    fn story(name: &str, text: &str) -> ReportStory {
        ReportStory {
            storyteller_name: name.to_string(),
            story_one: text.to_string(),
            story_two: None,
            story_three: None,
        }
    }

    fn sample_input() -> ReportInput {
        ReportInput {
            user_email: "me@example.com".to_string(),
            generated_on: "8/25/2026".to_string(),
            stories: vec![story("Maya Chen", "She kept the whole team calm during the outage.")],
            reflection: Some(ReportReflection {
                peak_moments: Some("Shipping the migration with zero downtime.".to_string()),
                natural_talents: Some("Explaining hard things simply.".to_string()),
                impact: Some("I make room for quieter voices.".to_string()),
                narrative: None,
            }),
        }
    }

    #[test]
    fn test_render_produces_pdf() {
        let rendered = render_report(&sample_input()).expect("render");
        assert!(rendered.bytes.starts_with(b"%PDF"));
        assert_eq!(rendered.page_count, 1);
    }

    #[test]
    fn test_render_is_deterministic() {
        let input = sample_input();
        let a = render_report(&input).expect("render");
        let b = render_report(&input).expect("render");
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_long_reports_paginate() {
        let mut input = sample_input();
        let long = "An unusually long story. ".repeat(60);
        input.stories = (0..12)
            .map(|i| story(&format!("Teller {i}"), &long))
            .collect();

        let rendered = render_report(&input).expect("render");
        assert!(rendered.page_count > 1);
        // More pages means more bytes than the one-pager
        let small = render_report(&sample_input()).expect("render");
        assert!(rendered.bytes.len() > small.bytes.len());
    }

    #[test]
    fn test_render_with_no_stories_or_reflection() {
        let input = ReportInput {
            user_email: "me@example.com".to_string(),
            generated_on: "8/25/2026".to_string(),
            stories: Vec::new(),
            reflection: None,
        };
        let rendered = render_report(&input).expect("render");
        assert!(rendered.bytes.starts_with(b"%PDF"));
        assert_eq!(rendered.page_count, 1);
    }

    fn seed_completed_account(db: &SareDb) -> Session {
        db.create_profile("u1", "me@example.com", None, None, None)
            .expect("profile");
        db.update_profile("u1", None, None, None, Some(1))
            .expect("goal");
        let session = Session::account("u1", "me@example.com");

        let teller = db
            .add_storyteller("u1", "Maya", "maya@example.com", None, None)
            .expect("add");
        let now = Utc::now();
        db.set_invitation_token("u1", &teller.id, "tok", now + Duration::days(7), now)
            .expect("issue");
        db.submit_story(&teller.id, "the story", None, None, now)
            .expect("submit");
        db.upsert_reflection("u1", Some("a"), Some("b"), Some("c"), None)
            .expect("reflection");
        db.complete_reflection("u1", now).expect("complete");
        session
    }

    #[test]
    fn test_generate_gated_until_ready() {
        let db = test_db();
        db.create_profile("u1", "me@example.com", None, None, None)
            .expect("profile");
        let session = Session::account("u1", "me@example.com");

        let result = generate_report(&db, &session, Utc::now());
        assert!(matches!(result, Err(SareError::ReportNotReady(_))));
    }

    #[test]
    fn test_generate_records_meta_and_lock_blocks() {
        let db = test_db();
        let session = seed_completed_account(&db);
        let now = Utc::now();

        let report = generate_report(&db, &session, now).expect("generate");
        assert!(report.bytes.starts_with(b"%PDF"));
        assert_eq!(report.meta.story_count, 1);
        assert!(report.meta.page_count >= 1);
        assert_eq!(
            report.filename,
            format!("SARE-Report-{}.pdf", now.format("%Y-%m-%d"))
        );

        // Regenerating while unlocked is fine
        generate_report(&db, &session, now + Duration::days(1)).expect("regenerate");

        lock_report(&db, &session).expect("lock");
        let result = generate_report(&db, &session, now + Duration::days(2));
        assert!(matches!(result, Err(SareError::ReportLocked)));
    }
}
