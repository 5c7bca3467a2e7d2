//! Convergence loop: open the comment section, scroll and load more until
//! the page stops growing or a budget runs out, then expand reply threads
//! and truncated bodies.
//!
//! Nothing here fails. A control that vanished, went stale or refused the
//! click is skipped; the worst outcome is an under-expanded page.

use super::patterns::{
    load_more_locators, open_comments_locators, reply_locators, see_more_locators,
    COMMENT_COUNTERS, CONTROL_SCAN_LIMIT, REPLY_EXPANSION_LIMIT, SEE_MORE_PHRASES,
};
use crate::core::CrawlerConfig;
use crate::features::pacing::{
    DelayRange, Pacer, AFTER_CLICK, AFTER_SCROLL, AFTER_SECTION_OPEN, AFTER_SEE_MORE_CLICK,
    BEFORE_REPLY_CLICK, BEFORE_SCROLL_LOOP, BEFORE_SEE_MORE_CLICK,
};
use crate::scraping::page::{ControlLocator, PageDriver};
use std::time::Duration;
use tracing::{debug, info};

pub const SCROLL_AMOUNT: i64 = 600;

/// Once this many iterations have run, a pass without any load-more click ends the loop.
pub const IDLE_ITERATIONS_BEFORE_STOP: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The visible-comment counter reached the requested target.
    TargetReached,
    /// No load-more control was clickable after the idle threshold.
    NoMoreContent,
    /// `max_scroll_attempts` iterations ran.
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceReport {
    pub section_opened: bool,
    pub iterations: u32,
    pub load_more_clicks: usize,
    pub replies_expanded: usize,
    pub see_more_expanded: usize,
    pub stop_reason: StopReason,
}

/// Knobs of one convergence run, taken from `CrawlerConfig`.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceLimits {
    pub max_iterations: u32,
    pub target_comments: Option<usize>,
    pub element_wait: Duration,
}

impl ConvergenceLimits {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_iterations: config.max_scroll_attempts,
            target_comments: config.max_comments_per_post,
            element_wait: config.element_wait,
        }
    }
}

pub async fn converge<D: PageDriver + ?Sized>(
    driver: &mut D,
    limits: ConvergenceLimits,
    pacer: &Pacer,
) -> ConvergenceReport {
    info!("Expanding comments...");
    let section_opened = open_comment_section(driver, limits.element_wait, pacer).await;
    pacer.pause(BEFORE_SCROLL_LOOP).await;

    let mut iterations = 0u32;
    let mut load_more_clicks = 0usize;
    let stop_reason = loop {
        if iterations >= limits.max_iterations {
            break StopReason::BudgetExhausted;
        }

        human_scroll(driver, SCROLL_AMOUNT, None, pacer).await;
        pacer.pause(AFTER_SCROLL).await;

        let clicked = click_load_more(driver, pacer).await;
        load_more_clicks += clicked;
        iterations += 1;

        if let Some(target) = limits.target_comments {
            let visible = count_visible_comments(driver).await;
            if visible >= target {
                info!("Reached target of {} comments ({} visible)", target, visible);
                break StopReason::TargetReached;
            }
        }

        if clicked == 0 && iterations > IDLE_ITERATIONS_BEFORE_STOP {
            info!("No more comments to load");
            break StopReason::NoMoreContent;
        }
    };

    let replies_expanded = expand_replies(driver, pacer).await;
    let see_more_expanded = expand_see_more(driver, pacer).await;

    ConvergenceReport {
        section_opened,
        iterations,
        load_more_clicks,
        replies_expanded,
        see_more_expanded,
        stop_reason,
    }
}

/// Click the first visible "view comments" control. `false` when none shows up,
/// which usually means the section is already open.
pub async fn open_comment_section<D: PageDriver + ?Sized>(
    driver: &mut D,
    wait: Duration,
    pacer: &Pacer,
) -> bool {
    for locator in open_comments_locators() {
        let Some(control) = driver.wait_for_control(&locator, wait).await else {
            continue;
        };
        match driver.click(&control, false).await {
            Ok(()) => {
                info!("Clicking comment button: {:?}", locator);
                pacer.pause(AFTER_SECTION_OPEN).await;
                return true;
            }
            Err(e) => debug!("comment button {:?} not clickable: {}", locator, e),
        }
    }
    debug!("No comment button found - comments may already be visible");
    false
}

/// Scroll `amount` pixels in 3–5 paced sub-steps.
pub async fn human_scroll<D: PageDriver + ?Sized>(
    driver: &mut D,
    amount: i64,
    selector: Option<&str>,
    pacer: &Pacer,
) {
    let sub_steps = pick_sub_steps();
    let step = amount / i64::from(sub_steps);
    for _ in 0..sub_steps {
        if let Err(e) = driver.scroll_step(step, selector).await {
            debug!("scroll step failed: {}", e);
        }
        pacer.scroll_sub_step(sub_steps).await;
    }
}

fn pick_sub_steps() -> u32 {
    use rand::prelude::*;
    rand::rng().random_range(3..=5)
}

/// Click every visible load-more control; returns the number of successful clicks.
pub async fn click_load_more<D: PageDriver + ?Sized>(driver: &mut D, pacer: &Pacer) -> usize {
    let mut clicked = 0;
    for locator in load_more_locators() {
        clicked += click_all(driver, &locator, CONTROL_SCAN_LIMIT, false, pacer, None, AFTER_CLICK)
            .await;
    }
    clicked
}

pub async fn expand_replies<D: PageDriver + ?Sized>(driver: &mut D, pacer: &Pacer) -> usize {
    info!("Expanding reply threads...");
    let mut expanded = 0;
    for locator in reply_locators() {
        expanded += click_all(
            driver,
            &locator,
            REPLY_EXPANSION_LIMIT,
            true,
            pacer,
            Some(BEFORE_REPLY_CLICK),
            AFTER_CLICK,
        )
        .await;
    }
    expanded
}

pub async fn expand_see_more<D: PageDriver + ?Sized>(driver: &mut D, pacer: &Pacer) -> usize {
    info!("Expanding truncated comments (See more buttons)...");
    let mut expanded = 0;
    for locator in see_more_locators() {
        let controls = match driver.visible_controls(&locator, CONTROL_SCAN_LIMIT).await {
            Ok(c) => c,
            Err(e) => {
                debug!("see-more lookup {:?} failed: {}", locator, e);
                continue;
            }
        };
        debug!("Found {} 'See more' controls with {:?}", controls.len(), locator);
        for control in controls {
            let caption = control.text.to_lowercase();
            if !SEE_MORE_PHRASES.iter().any(|p| caption.contains(p)) {
                continue;
            }
            pacer.pause(BEFORE_SEE_MORE_CLICK).await;
            match driver.click(&control, true).await {
                Ok(()) => {
                    expanded += 1;
                    pacer.pause(AFTER_SEE_MORE_CLICK).await;
                }
                Err(e) => debug!("Error clicking see more control: {}", e),
            }
        }
    }
    info!("Expanded {} truncated comments", expanded);
    expanded
}

async fn click_all<D: PageDriver + ?Sized>(
    driver: &mut D,
    locator: &ControlLocator,
    limit: usize,
    reveal: bool,
    pacer: &Pacer,
    before: Option<DelayRange>,
    after: DelayRange,
) -> usize {
    let controls = match driver.visible_controls(locator, limit).await {
        Ok(c) => c,
        Err(e) => {
            debug!("control lookup {:?} failed: {}", locator, e);
            return 0;
        }
    };
    let mut clicked = 0;
    for control in controls {
        if let Some(range) = before {
            pacer.pause(range).await;
        }
        match driver.click(&control, reveal).await {
            Ok(()) => {
                clicked += 1;
                pacer.pause(after).await;
            }
            Err(e) => debug!("click {:?} skipped: {}", locator, e),
        }
    }
    clicked
}

/// Best-effort visible-comment count: the first counter selector with any hits.
pub async fn count_visible_comments<D: PageDriver + ?Sized>(driver: &mut D) -> usize {
    for css in COMMENT_COUNTERS {
        let n = driver.count(css).await;
        if n > 0 {
            return n;
        }
    }
    0
}
