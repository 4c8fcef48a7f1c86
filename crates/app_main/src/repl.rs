//! Line-oriented reader driven from stdin

use app_core::{
    build_spreads, Direction, PageLayout, PageList, ReaderError, ReaderEvent, ReaderSession, ReaderState,
    ReadingDirection, Spread,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "n next | p previous | ] chapter on the right | [ chapter on the left | g <page> go to page \
                    | s save page | t toggle shift | l <single|double|split> layout | q quit";

/// Which neighbour a bracket key points at on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    NextPage,
    PreviousPage,
    Chapter(Side),
    GoTo(usize),
    Save,
    ToggleShift,
    Layout(PageLayout),
    Help,
    Quit,
}

impl Input {
    fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or("");
        let argument = words.next();

        match command {
            "n" | "" => Ok(Input::NextPage),
            "p" => Ok(Input::PreviousPage),
            "]" => Ok(Input::Chapter(Side::Right)),
            "[" => Ok(Input::Chapter(Side::Left)),
            "g" => argument
                .and_then(|a| a.parse::<usize>().ok())
                .filter(|page| *page > 0)
                .map(Input::GoTo)
                .ok_or_else(|| "usage: g <page number>".to_string()),
            "s" => Ok(Input::Save),
            "t" => Ok(Input::ToggleShift),
            "l" => match argument {
                Some("single") => Ok(Input::Layout(PageLayout::Single)),
                Some("double") => Ok(Input::Layout(PageLayout::Double)),
                Some("split") => Ok(Input::Layout(PageLayout::Split)),
                _ => Err("usage: l <single|double|split>".to_string()),
            },
            "h" | "?" => Ok(Input::Help),
            "q" => Ok(Input::Quit),
            other => Err(format!("unknown command '{}' (h for help)", other)),
        }
    }
}

/// Right-to-left books put the next chapter on the left
fn chapter_direction(side: Side, reading: ReadingDirection) -> Direction {
    match (side, reading) {
        (Side::Right, ReadingDirection::LeftToRight) | (Side::Left, ReadingDirection::RightToLeft) => Direction::Next,
        _ => Direction::Previous,
    }
}

/// Screens of the current chapter under the active layout
fn screens(pages: &PageList, state: &ReaderState) -> Vec<Spread> {
    if state.layout.is_double() {
        build_spreads(pages, state.layout.shifted)
    } else {
        (0..pages.len()).map(Spread::Single).collect()
    }
}

fn show(session: &ReaderSession, pages: &PageList, screen: Spread) {
    match screen {
        Spread::Single(i) => session.on_page_selected(&pages[i], false),
        Spread::Double(a, b) => session.on_page_selected(&pages[a], b + 1 == pages.len()),
    }
}

fn select_index(session: &ReaderSession, index: usize) {
    let state = session.state();
    let Some(pages) = state.viewer_chapters.as_ref().and_then(|v| v.curr.pages()) else {
        return;
    };
    if let Some(page) = pages.get(index.min(pages.len().saturating_sub(1))) {
        session.on_page_selected(page, false);
    }
}

async fn change_chapter(session: &ReaderSession, direction: Direction) -> Result<(), ReaderError> {
    match session.load_adjacent(direction).await? {
        Some(resume) => select_index(session, resume),
        None => println!(
            "No {} chapter",
            if direction == Direction::Next { "next" } else { "previous" }
        ),
    }
    Ok(())
}

async fn step(session: &ReaderSession, forward: bool) -> Result<(), ReaderError> {
    let state = session.state();
    let chapters = state.viewer_chapters.clone().ok_or(ReaderError::NotInitialized)?;
    let Some(pages) = chapters.curr.pages() else {
        return Ok(());
    };

    let screens = screens(&pages, &state);
    let index = state.page_index();
    let position = screens.iter().position(|s| s.contains(index)).unwrap_or(0);

    // Warm up the next chapter shortly before the reader gets there
    if forward && position + 3 >= screens.len() {
        if let Some(next) = &chapters.next {
            session.preload(next);
        }
    }

    let target = if forward { Some(position + 1) } else { position.checked_sub(1) };
    if let Some(screen) = target.and_then(|t| screens.get(t)) {
        show(session, &pages, *screen);
        return Ok(());
    }

    // Past either end: the adjacent chapter's page crosses over when loaded
    let (adjacent, direction) = if forward {
        (chapters.next.as_ref(), Direction::Next)
    } else {
        (chapters.prev.as_ref(), Direction::Previous)
    };
    match adjacent.and_then(|r| r.pages()).filter(|p| !p.is_empty()) {
        Some(adjacent_pages) => {
            let index = if forward { 0 } else { adjacent_pages.len() - 1 };
            session.on_page_selected(&adjacent_pages[index], false);
            Ok(())
        }
        None => change_chapter(session, direction).await,
    }
}

fn current_page(state: &ReaderState) -> Option<std::sync::Arc<app_core::Page>> {
    let pages = state.viewer_chapters.as_ref()?.curr.pages()?;
    pages.get(state.page_index()).cloned()
}

fn print_status(state: &ReaderState) {
    let Some(chapters) = &state.viewer_chapters else {
        return;
    };
    let chapter = chapters.curr.chapter();
    let total = chapters.curr.pages().map(|p| p.len()).unwrap_or(0);
    let title = state.manga.as_ref().map(|m| m.title.as_str()).unwrap_or("");

    let mut line = format!("{} | {} | page {}/{}", title, chapter.name, state.page_index() + 1, total);
    if state.layout.is_double() {
        line.push_str(if state.layout.shifted { " | double (shifted)" } else { " | double" });
    }
    if chapter.read {
        line.push_str(" | read");
    }
    if state.is_loading_adjacent_chapter {
        line.push_str(" | loading");
    }
    println!("{}", line);
}

fn print_event(event: &ReaderEvent) {
    match event {
        ReaderEvent::ReloadViewerChapters | ReaderEvent::AdjacentLoadStarted(_) => {}
        ReaderEvent::AdjacentLoadFinished { direction, resume_page } => {
            tracing::debug!(?direction, resume_page, "Adjacent chapter ready");
        }
        ReaderEvent::ChapterLoadError { message, .. } => println!("! {}", message),
        ReaderEvent::SavedImage(Ok(path)) => println!("Saved to {}", path.display()),
        ReaderEvent::SavedImage(Err(message)) | ReaderEvent::ShareImage(Err(message)) => {
            println!("! {}", message)
        }
        ReaderEvent::ShareImage(Ok(path)) => println!("Ready to share: {}", path.display()),
        ReaderEvent::TrackingErrors(errors) => {
            for error in errors {
                println!("! {}: {}", error.service, error.error.as_deref().unwrap_or("failed"));
            }
        }
    }
}

/// Read commands until `q` or end of input
pub async fn run(session: &ReaderSession) -> anyhow::Result<()> {
    if let Some(mut events) = session.take_events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                print_event(&event);
            }
        });
    }

    println!("{}", HELP);
    print_status(&session.state());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = match Input::parse(&line) {
            Ok(input) => input,
            Err(message) => {
                println!("{}", message);
                continue;
            }
        };

        let result = match input {
            Input::Quit => break,
            Input::Help => {
                println!("{}", HELP);
                Ok(())
            }
            Input::NextPage => step(session, true).await,
            Input::PreviousPage => step(session, false).await,
            Input::Chapter(side) => {
                let direction = chapter_direction(side, session.config().reader.reading_direction);
                change_chapter(session, direction).await
            }
            Input::GoTo(number) => {
                select_index(session, number - 1);
                Ok(())
            }
            Input::Save => {
                match current_page(&session.state()) {
                    Some(page) => session.save_image(&page),
                    None => println!("No page to save"),
                }
                Ok(())
            }
            Input::ToggleShift => {
                session.toggle_double_shift();
                Ok(())
            }
            Input::Layout(layout) => {
                session.set_page_layout(layout);
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("! {}", e.user_message());
        }
        session.wait_idle().await;
        print_status(&session.state());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Input::parse("n"), Ok(Input::NextPage));
        assert_eq!(Input::parse(""), Ok(Input::NextPage));
        assert_eq!(Input::parse("]"), Ok(Input::Chapter(Side::Right)));
        assert_eq!(Input::parse("g 12"), Ok(Input::GoTo(12)));
        assert_eq!(Input::parse(" l  double "), Ok(Input::Layout(PageLayout::Double)));
        assert!(Input::parse("g 0").is_err());
        assert!(Input::parse("g").is_err());
        assert!(Input::parse("l sideways").is_err());
        assert!(Input::parse("zoom").is_err());
    }

    #[test]
    fn test_bracket_keys_follow_reading_direction() {
        let ltr = ReadingDirection::LeftToRight;
        let rtl = ReadingDirection::RightToLeft;
        assert_eq!(chapter_direction(Side::Right, ltr), Direction::Next);
        assert_eq!(chapter_direction(Side::Left, ltr), Direction::Previous);
        assert_eq!(chapter_direction(Side::Left, rtl), Direction::Next);
        assert_eq!(chapter_direction(Side::Right, rtl), Direction::Previous);
    }
}
