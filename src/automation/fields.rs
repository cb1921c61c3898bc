//! Ordered lookup strategies for every control the run touches.
//!
//! Each fillable field is a [`FieldPlan`]: a list of [`FillStrategy`]s, tried
//! in order, each naming one locator per value to type. A strategy applies
//! only when *all* of its slots are present; the first one that fills
//! cleanly wins. Buttons and the download link work the same way through
//! [`ClickPlan`]. Exhausting a plan is fatal for the step.
//!
//! Order: accessible label first, then known GOV.UK ids and names, then
//! positional fallbacks.

use crate::automation::browser::BrowserSession;
use crate::automation::locator::Locator;
use crate::error::{BrowserError, RunError};
use std::time::Duration;
use tracing::{debug, warn};

/// One locator plus which of its matches to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub locator: Locator,
    pub nth: usize,
}

impl Slot {
    fn first(locator: Locator) -> Self {
        Self { locator, nth: 0 }
    }
}

/// One way of filling a field: a slot per value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillStrategy {
    pub name: String,
    pub slots: Vec<Slot>,
}

impl FillStrategy {
    fn single(locator: Locator) -> Self {
        Self {
            name: locator.to_string(),
            slots: vec![Slot::first(locator)],
        }
    }

    fn triple(name: &str, a: Locator, b: Locator, c: Locator) -> Self {
        Self {
            name: name.to_string(),
            slots: vec![Slot::first(a), Slot::first(b), Slot::first(c)],
        }
    }

    async fn present(&self, session: &mut dyn BrowserSession) -> Result<bool, BrowserError> {
        for slot in &self.slots {
            if session.count(&slot.locator).await? <= slot.nth {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Ordered strategies for one form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPlan {
    /// Used in the "… not found" error.
    pub what: &'static str,
    pub strategies: Vec<FillStrategy>,
}

impl FieldPlan {
    pub fn share_code() -> Self {
        Self {
            what: "Share code input",
            strategies: vec![
                FillStrategy::single(Locator::label("Share code")),
                FillStrategy::single(Locator::css("input#shareCode")),
                FillStrategy::single(Locator::css("input[name='shareCode']")),
                FillStrategy::single(Locator::css("input[name='share_code']")),
                FillStrategy::single(Locator::css("input#share-code")),
                FillStrategy::single(Locator::css("input[name='share-code']")),
                FillStrategy::single(Locator::css("input[type='text']")),
            ],
        }
    }

    /// Day, month and year, in that order.
    pub fn date_of_birth() -> Self {
        let text_input = || Locator::css("input[type='text']");
        Self {
            what: "DOB inputs",
            strategies: vec![
                FillStrategy::triple(
                    "labels Day/Month/Year",
                    Locator::label("Day"),
                    Locator::label("Month"),
                    Locator::label("Year"),
                ),
                FillStrategy::triple(
                    "#dateOfBirth-*",
                    Locator::css("#dateOfBirth-day"),
                    Locator::css("#dateOfBirth-month"),
                    Locator::css("#dateOfBirth-year"),
                ),
                FillStrategy::triple(
                    "name=dateOfBirth-*",
                    Locator::css("input[name='dateOfBirth-day']"),
                    Locator::css("input[name='dateOfBirth-month']"),
                    Locator::css("input[name='dateOfBirth-year']"),
                ),
                FillStrategy::triple(
                    "#dob-*",
                    Locator::css("#dob-day"),
                    Locator::css("#dob-month"),
                    Locator::css("#dob-year"),
                ),
                FillStrategy {
                    name: "first three text inputs".to_string(),
                    slots: (0..3)
                        .map(|nth| Slot {
                            locator: text_input(),
                            nth,
                        })
                        .collect(),
                },
            ],
        }
    }

    pub fn company_name() -> Self {
        Self {
            what: "Company name input",
            strategies: vec![
                FillStrategy::single(Locator::label("Company name")),
                FillStrategy::single(Locator::css("input#companyName")),
                FillStrategy::single(Locator::css("input[name='companyName']")),
                FillStrategy::single(Locator::css("input[name='company_name']")),
                FillStrategy::single(Locator::css("input[type='text']")),
            ],
        }
    }

    /// Fill `values` with the first strategy whose slots are all present.
    /// Returns that strategy's name.
    pub async fn fill(&self, session: &mut dyn BrowserSession, values: &[&str]) -> Result<String, RunError> {
        for strategy in &self.strategies {
            if strategy.slots.len() != values.len() {
                continue;
            }
            match strategy.present(session).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("{}: '{}' not on page", self.what, strategy.name);
                    continue;
                }
                Err(e) => {
                    debug!("{}: '{}' lookup failed: {}", self.what, strategy.name, e);
                    continue;
                }
            }

            let mut filled = true;
            for (slot, value) in strategy.slots.iter().zip(values) {
                if let Err(e) = session.fill(&slot.locator, slot.nth, value).await {
                    warn!("{}: filling via '{}' failed: {}", self.what, strategy.name, e);
                    filled = false;
                    break;
                }
            }
            if filled {
                debug!("{} filled via '{}'", self.what, strategy.name);
                return Ok(strategy.name.clone());
            }
        }
        Err(RunError::ElementNotFound {
            what: self.what.to_string(),
        })
    }
}

/// Ordered locators for one button or link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickPlan {
    pub what: &'static str,
    pub locators: Vec<Locator>,
}

impl ClickPlan {
    pub fn start_now() -> Self {
        Self {
            what: "Start now button",
            locators: vec![
                Locator::text("a.govuk-button", "Start now"),
                Locator::text("a", "Start now"),
                Locator::text("button", "Start now"),
            ],
        }
    }

    pub fn continue_button() -> Self {
        Self {
            what: "Continue button",
            locators: vec![
                Locator::text("button", "Continue"),
                Locator::css("input[type='submit'][value='Continue']"),
                Locator::text("a.govuk-button", "Continue"),
            ],
        }
    }

    pub fn download_pdf() -> Self {
        Self {
            what: "Download PDF link",
            locators: vec![Locator::text("a", "Download PDF"), Locator::link("Download PDF")],
        }
    }

    /// Click the first present locator. Returns its description.
    pub async fn click(&self, session: &mut dyn BrowserSession, timeout: Duration) -> Result<String, RunError> {
        for locator in &self.locators {
            if !is_present(session, locator).await {
                continue;
            }
            match session.click(locator, timeout).await {
                Ok(()) => return Ok(locator.to_string()),
                Err(e) => warn!("{}: click on {} failed: {}", self.what, locator, e),
            }
        }
        Err(RunError::ElementNotFound {
            what: self.what.to_string(),
        })
    }

    /// Download through the first present locator that yields bytes.
    pub async fn download(
        &self,
        session: &mut dyn BrowserSession,
        timeout: Duration,
    ) -> Result<(Vec<u8>, String), RunError> {
        let mut last_error: Option<BrowserError> = None;
        for locator in &self.locators {
            if !is_present(session, locator).await {
                continue;
            }
            match session.download(locator, timeout).await {
                Ok(bytes) if !bytes.is_empty() => return Ok((bytes, locator.to_string())),
                Ok(_) => {
                    warn!("{}: {} returned an empty file", self.what, locator);
                    last_error = Some(BrowserError::BadResponse("empty download".into()));
                }
                Err(e) => {
                    warn!("{}: download via {} failed: {}", self.what, locator, e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(RunError::Download(e.to_string())),
            None => Err(RunError::ElementNotFound {
                what: self.what.to_string(),
            }),
        }
    }
}

async fn is_present(session: &mut dyn BrowserSession, locator: &Locator) -> bool {
    match session.count(locator).await {
        Ok(n) => n > 0,
        Err(e) => {
            debug!("Lookup of {} failed: {}", locator, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dob_plan_prefers_labels_and_ends_positionally() {
        let plan = FieldPlan::date_of_birth();
        assert_eq!(plan.strategies[0].slots[0].locator, Locator::label("Day"));
        let last = plan.strategies.last().unwrap();
        assert_eq!(last.slots.len(), 3);
        assert_eq!(
            last.slots.iter().map(|s| s.nth).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn every_plan_has_a_label_or_text_first() {
        for plan in [FieldPlan::share_code(), FieldPlan::company_name()] {
            assert!(matches!(plan.strategies[0].slots[0].locator, Locator::Label(_)));
            assert_eq!(
                plan.strategies.last().unwrap().slots[0].locator,
                Locator::css("input[type='text']")
            );
        }
    }

    #[test]
    fn download_has_role_fallback() {
        let plan = ClickPlan::download_pdf();
        assert_eq!(plan.locators.last(), Some(&Locator::link("Download PDF")));
    }
}
