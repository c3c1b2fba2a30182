//! Conversion call-accounting harness.
//!
//! # Responsibility
//! - Drive create/read/update/query sequences against a `StoreFactory`.
//! - Assert how many conversions each sequence triggers, per direction.
//! - Delete every instance of the tracked variants after each scenario.
//!
//! # Invariants
//! - At most one session is open at a time; it is released on every path.
//! - Every transaction the harness begins ends in commit or rollback.
//! - The harness branches on `RectVariant` only to pick the point parameter
//!   type of value queries.

use crate::convert::{ConversionCounter, ConvertError, CounterDelta};
use crate::model::point::{ConvertiblePoint, Point};
use crate::model::rect::{Rect, RectId, RectVariant};
use crate::store::{EntityStore, QueryValue, RectQuery, StoreError, StoreFactory};
use log::{error, info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod factory;
pub mod teardown;

pub use factory::RectFactoryRegistry;
pub use teardown::TeardownRegistry;

const UL_X: i32 = 1;
const UL_Y: i32 = 10;
const LR_X: i32 = 10;
const LR_Y: i32 = 1;

/// Stored form of the upper-left point of the third created rect.
pub const THIRD_UPPER_LEFT_ENCODED: &str = "3:12";

const QUERY_BATCH_SIZE: i32 = 5;

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Scenario failures.
#[derive(Debug)]
pub enum HarnessError {
    /// No session could be opened; the scenario cannot run.
    StoreUnavailable(StoreError),
    Store(StoreError),
    Convert(ConvertError),
    /// A counter delta or field value did not match.
    Check {
        check: &'static str,
        expected: String,
        actual: String,
    },
    UnregisteredVariant(RectVariant),
}

impl Display for HarnessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreUnavailable(err) => write!(f, "store unavailable: {err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Convert(err) => write!(f, "{err}"),
            Self::Check {
                check,
                expected,
                actual,
            } => write!(f, "{check}: expected {expected}, got {actual}"),
            Self::UnregisteredVariant(variant) => {
                write!(f, "no rect constructor registered for {}", variant.as_str())
            }
        }
    }
}

impl Error for HarnessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Convert(err) => Some(err),
            Self::Check { .. } => None,
            Self::UnregisteredVariant(_) => None,
        }
    }
}

impl From<StoreError> for HarnessError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<ConvertError> for HarnessError {
    fn from(value: ConvertError) -> Self {
        Self::Convert(value)
    }
}

/// Operation sequences the harness knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Store,
    Read,
    Modify,
    QueryWithPointParameter,
    QueryWithStringParameter,
    QueryWithLiteral,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Store,
        Scenario::Read,
        Scenario::Modify,
        Scenario::QueryWithPointParameter,
        Scenario::QueryWithStringParameter,
        Scenario::QueryWithLiteral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Read => "read",
            Self::Modify => "modify",
            Self::QueryWithPointParameter => "query_with_point_parameter",
            Self::QueryWithStringParameter => "query_with_string_parameter",
            Self::QueryWithLiteral => "query_with_literal",
        }
    }
}

/// Counter deltas observed by the measured step of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub variant: &'static str,
    pub created: usize,
    pub delta: CounterDelta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    /// Commit when the body succeeds, roll back otherwise.
    CommitOnSuccess,
    /// Commit even when the body fails; the body error wins.
    AlwaysCommit,
}

/// Runs conversion scenarios against sessions from `F`.
pub struct ConversionHarness<F: StoreFactory> {
    factory: F,
    session: Option<F::Session>,
    counter: Arc<ConversionCounter>,
    teardown: TeardownRegistry,
    entities: RectFactoryRegistry,
}

impl<F: StoreFactory> ConversionHarness<F> {
    /// Creates a harness reading `counter`, which must be the counter the
    /// factory's converters record into.
    pub fn new(factory: F, counter: Arc<ConversionCounter>) -> Self {
        Self::with_entities(factory, counter, RectFactoryRegistry::with_defaults())
    }

    pub fn with_entities(
        factory: F,
        counter: Arc<ConversionCounter>,
        entities: RectFactoryRegistry,
    ) -> Self {
        Self {
            factory,
            session: None,
            counter,
            teardown: TeardownRegistry::new(),
            entities,
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn counter(&self) -> &Arc<ConversionCounter> {
        &self.counter
    }

    pub fn teardown_registry(&self) -> &TeardownRegistry {
        &self.teardown
    }

    pub fn has_open_session(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.is_closed())
    }

    /// Tracks `variant` for the next teardown.
    pub fn set_up(&mut self, variant: RectVariant) {
        self.teardown.register(variant);
    }

    /// Sets up, runs one scenario, and always tears down.
    ///
    /// The scenario error wins over a teardown error.
    pub fn run_isolated(
        &mut self,
        scenario: Scenario,
        variant: RectVariant,
    ) -> HarnessResult<ScenarioReport> {
        self.set_up(variant);
        let outcome = self.run(scenario, variant);
        let teardown = self.tear_down();
        let report = outcome?;
        teardown?;
        Ok(report)
    }

    pub fn run(&mut self, scenario: Scenario, variant: RectVariant) -> HarnessResult<ScenarioReport> {
        let report = match scenario {
            Scenario::Store => self.run_store(variant),
            Scenario::Read => self.run_read(variant),
            Scenario::Modify => self.run_modify(variant),
            Scenario::QueryWithPointParameter => self.run_query_with_point_parameter(variant),
            Scenario::QueryWithStringParameter => self.run_query_with_string_parameter(variant),
            Scenario::QueryWithLiteral => self.run_query_with_literal(variant),
        };
        match &report {
            Ok(report) => info!(
                "event=scenario module=harness status=ok name={} variant={} to_datastore={} to_attribute={}",
                scenario.as_str(),
                variant.as_str(),
                report.delta.to_datastore,
                report.delta.to_attribute
            ),
            Err(err) => error!(
                "event=scenario module=harness status=error name={} variant={} error={}",
                scenario.as_str(),
                variant.as_str(),
                err
            ),
        }
        report
    }

    /// Creating one rect converts both points to the datastore, nothing back.
    pub fn run_store(&mut self, variant: RectVariant) -> HarnessResult<ScenarioReport> {
        let before = self.counter.snapshot();
        self.create_rects(variant, 1)?;
        let delta = self.counter.snapshot().delta_since(&before);

        expect_exact("store: to_datastore calls", 2, delta.to_datastore)?;
        expect_exact("store: to_attribute calls", 0, delta.to_attribute)?;
        Ok(report(Scenario::Store, variant, 1, delta))
    }

    /// A cold read converts each point back once, on first field access.
    pub fn run_read(&mut self, variant: RectVariant) -> HarnessResult<ScenarioReport> {
        let id = self.create_one(variant)?;
        self.evict_and_release(variant)?;

        let before = self.counter.snapshot();
        let (upper_left, lower_right) =
            self.in_transaction(Finish::CommitOnSuccess, |session| {
                let rect = session.get_object_by_id(variant, id)?;
                Ok((rect.upper_left()?, rect.lower_right()?))
            })?;
        let delta = self.counter.snapshot().delta_since(&before);

        expect_exact("read: to_datastore calls", 0, delta.to_datastore)?;
        expect_exact("read: to_attribute calls", 2, delta.to_attribute)?;
        expect_point("read: upper_left", Point::new(UL_X, UL_Y), upper_left)?;
        expect_point("read: lower_right", Point::new(LR_X, LR_Y), lower_right)?;
        Ok(report(Scenario::Read, variant, 1, delta))
    }

    /// Reading then replacing both points converts each once per direction.
    pub fn run_modify(&mut self, variant: RectVariant) -> HarnessResult<ScenarioReport> {
        let id = self.create_one(variant)?;
        self.evict_and_release(variant)?;

        let updated_upper_left = Point::new(UL_X + 1, UL_Y + 1);
        let updated_lower_right = Point::new(LR_X + 1, LR_Y + 1);

        let before = self.counter.snapshot();
        self.in_transaction(Finish::CommitOnSuccess, |session| {
            let rect = session.get_object_by_id(variant, id)?;
            rect.lower_right()?;
            rect.upper_left()?;
            rect.set_upper_left(Some(updated_upper_left));
            rect.set_lower_right(Some(updated_lower_right));
            expect_exact("modify: rect is dirty", true, rect.is_dirty())
        })?;
        let delta = self.counter.snapshot().delta_since(&before);

        expect_exact("modify: to_datastore calls", 2, delta.to_datastore)?;
        expect_exact("modify: to_attribute calls", 2, delta.to_attribute)?;

        self.evict_and_release(variant)?;
        let (upper_left, lower_right) =
            self.in_transaction(Finish::CommitOnSuccess, |session| {
                let rect = session.get_object_by_id(variant, id)?;
                Ok((rect.upper_left()?, rect.lower_right()?))
            })?;
        expect_point("modify: stored upper_left", updated_upper_left, upper_left)?;
        expect_point("modify: stored lower_right", updated_lower_right, lower_right)?;
        Ok(report(Scenario::Modify, variant, 1, delta))
    }

    /// Querying by a point value converts the parameter and the matched row.
    ///
    /// Exact counts are store dependent, so only lower bounds are checked.
    pub fn run_query_with_point_parameter(
        &mut self,
        variant: RectVariant,
    ) -> HarnessResult<ScenarioReport> {
        self.create_query_batch(variant)?;

        let target = Point::new(UL_X + 1, UL_Y + 1);
        let query = RectQuery::new(variant, "this.upperLeft == :point")
            .with_parameters(vec![point_parameter(variant, target)]);

        let before = self.counter.snapshot();
        self.expect_single_match(&query, 1)?;
        let delta = self.counter.snapshot().delta_since(&before);

        expect_at_least("query by point: to_datastore calls", 1, delta.to_datastore)?;
        expect_at_least("query by point: to_attribute calls", 2, delta.to_attribute)?;
        Ok(report(
            Scenario::QueryWithPointParameter,
            variant,
            QUERY_BATCH_SIZE as usize,
            delta,
        ))
    }

    /// Querying by an encoded string bypasses the converter for the operand.
    pub fn run_query_with_string_parameter(
        &mut self,
        variant: RectVariant,
    ) -> HarnessResult<ScenarioReport> {
        let query = RectQuery::new(variant, "this.upperLeft == str")
            .declare_parameters("String str")
            .map_err(StoreError::from)?
            .with_parameters(vec![QueryValue::Text(THIRD_UPPER_LEFT_ENCODED.to_string())]);
        self.run_encoded_query(Scenario::QueryWithStringParameter, variant, query)
    }

    /// Same as the string parameter case with the value embedded in the filter.
    pub fn run_query_with_literal(&mut self, variant: RectVariant) -> HarnessResult<ScenarioReport> {
        let query = RectQuery::new(
            variant,
            format!("this.upperLeft == \"{THIRD_UPPER_LEFT_ENCODED}\""),
        );
        self.run_encoded_query(Scenario::QueryWithLiteral, variant, query)
    }

    fn run_encoded_query(
        &mut self,
        scenario: Scenario,
        variant: RectVariant,
        query: RectQuery,
    ) -> HarnessResult<ScenarioReport> {
        self.create_query_batch(variant)?;

        let before = self.counter.snapshot();
        self.expect_single_match(&query, 2)?;
        let delta = self.counter.snapshot().delta_since(&before);

        expect_exact("query by string: to_datastore calls", 0, delta.to_datastore)?;
        expect_at_least("query by string: to_attribute calls", 2, delta.to_attribute)?;
        Ok(report(scenario, variant, QUERY_BATCH_SIZE as usize, delta))
    }

    /// Creates the query batch, checks its deltas, then forces a cold session.
    fn create_query_batch(&mut self, variant: RectVariant) -> HarnessResult<()> {
        let before = self.counter.snapshot();
        self.create_rects(variant, QUERY_BATCH_SIZE)?;
        let delta = self.counter.snapshot().delta_since(&before);

        expect_exact(
            "query setup: to_datastore calls",
            2 * QUERY_BATCH_SIZE as u64,
            delta.to_datastore,
        )?;
        expect_exact("query setup: to_attribute calls", 0, delta.to_attribute)?;
        self.evict_and_release(variant)
    }

    /// Runs `query`, expecting exactly the rect created with `offset`.
    fn expect_single_match(&mut self, query: &RectQuery, offset: i32) -> HarnessResult<()> {
        self.in_transaction(Finish::AlwaysCommit, |session| {
            let results = session.query(query)?;
            expect_exact("query: result count", 1, results.len())?;
            let rect = &results[0];
            expect_point(
                "query: upper_left",
                Point::new(UL_X + offset, UL_Y + offset),
                rect.upper_left()?,
            )?;
            expect_point(
                "query: lower_right",
                Point::new(LR_X + offset, LR_Y + offset),
                rect.lower_right()?,
            )
        })
    }

    /// Persists `count` rects in one transaction; returns the first id.
    ///
    /// The i-th rect is offset by `i` on every coordinate.
    pub fn create_rects(
        &mut self,
        variant: RectVariant,
        count: i32,
    ) -> HarnessResult<Option<RectId>> {
        if count < 1 {
            return Ok(None);
        }
        let rects = (0..count)
            .map(|offset| self.new_rect(variant, offset))
            .collect::<HarnessResult<Vec<_>>>()?;

        let session = self.session()?;
        let result = persist_all(session, &rects);
        if session.is_active() {
            if let Err(err) = session.rollback() {
                warn!("event=create_rects module=harness status=error action=rollback error={err}");
            }
        }
        result
    }

    fn create_one(&mut self, variant: RectVariant) -> HarnessResult<RectId> {
        self.create_rects(variant, 1)?.ok_or(HarnessError::Check {
            check: "create: first rect id",
            expected: "an id".to_string(),
            actual: "none".to_string(),
        })
    }

    fn new_rect(&self, variant: RectVariant, offset: i32) -> HarnessResult<Rect> {
        let rect = self.entities.create(variant)?;
        rect.set_upper_left(Some(Point::new(UL_X + offset, UL_Y + offset)));
        rect.set_lower_right(Some(Point::new(LR_X + offset, LR_Y + offset)));
        Ok(rect)
    }

    /// Deletes every instance of the tracked variants, then clears the
    /// registry and releases the session whether or not deletion succeeded.
    pub fn tear_down(&mut self) -> HarnessResult<()> {
        if self.teardown.is_empty() {
            return Ok(());
        }
        let variants = self.teardown.variants();
        let deleted = self.delete_all(&variants);

        self.teardown.clear();
        let released = self.release_session();
        deleted?;
        released
    }

    fn delete_all(&mut self, variants: &[RectVariant]) -> HarnessResult<()> {
        let session = self.session()?;
        session.begin()?;
        for variant in variants {
            let rects = all_objects(session, *variant);
            session.delete_persistent_all(&rects)?;
        }
        session.commit()?;
        Ok(())
    }

    /// Returns the open session, opening one if needed.
    ///
    /// # Errors
    /// - `HarnessError::StoreUnavailable` when no session can be opened.
    pub fn session(&mut self) -> HarnessResult<&mut F::Session> {
        let reusable = self
            .session
            .as_ref()
            .is_some_and(|session| !session.is_closed());
        if !reusable {
            let session = self.factory.open_session().map_err(|err| {
                error!("event=session_open module=harness status=error error={err}");
                HarnessError::StoreUnavailable(err)
            })?;
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .ok_or_else(|| HarnessError::StoreUnavailable(StoreError::Closed))
    }

    /// Closes the held session, rolling back any active transaction.
    pub fn release_session(&mut self) -> HarnessResult<()> {
        match self.session.take() {
            Some(mut session) if !session.is_closed() => Ok(session.close()?),
            _ => Ok(()),
        }
    }

    /// Evicts cached instances and closes the session so the next read is cold.
    pub fn evict_and_release(&mut self, variant: RectVariant) -> HarnessResult<()> {
        self.factory.evict_all(variant);
        self.release_session()
    }

    /// Runs `body` in one transaction on the held session.
    ///
    /// A transaction still active after `finish` ran (a failed commit
    /// included) is rolled back before returning.
    fn in_transaction<T>(
        &mut self,
        finish: Finish,
        body: impl FnOnce(&mut F::Session) -> HarnessResult<T>,
    ) -> HarnessResult<T> {
        let session = self.session()?;
        session.begin()?;
        let outcome = body(&mut *session);

        let result = match (outcome, finish) {
            (Ok(value), _) => session.commit().map(|()| value).map_err(HarnessError::from),
            (Err(err), Finish::AlwaysCommit) => {
                if session.is_active() {
                    if let Err(commit_err) = session.commit() {
                        warn!("event=tx_finish module=harness status=error action=commit error={commit_err}");
                    }
                }
                Err(err)
            }
            (Err(err), Finish::CommitOnSuccess) => Err(err),
        };
        if session.is_active() {
            if let Err(rollback_err) = session.rollback() {
                warn!("event=tx_finish module=harness status=error action=rollback error={rollback_err}");
            }
        }
        result
    }
}

fn persist_all<S: EntityStore>(session: &mut S, rects: &[Rect]) -> HarnessResult<Option<RectId>> {
    session.begin()?;
    let mut first = None;
    for rect in rects {
        let id = session.make_persistent(rect)?;
        first.get_or_insert(id);
    }
    session.commit()?;
    Ok(first)
}

/// Enumerates `variant`, degrading to an empty set when the store cannot.
fn all_objects<S: EntityStore>(session: &mut S, variant: RectVariant) -> Vec<Rect> {
    match session.extent(variant) {
        Ok(rects) => rects,
        Err(err) => {
            error!(
                "event=extent module=harness status=error variant={} error={err}",
                variant.as_str()
            );
            Vec::new()
        }
    }
}

/// Point parameter of the type accepted by `variant`'s mapping.
fn point_parameter(variant: RectVariant, point: Point) -> QueryValue {
    match variant {
        RectVariant::FieldConverted => QueryValue::Point(point),
        RectVariant::TypeConverted => QueryValue::ConvertiblePoint(ConvertiblePoint::from(point)),
    }
}

fn report(
    scenario: Scenario,
    variant: RectVariant,
    created: usize,
    delta: CounterDelta,
) -> ScenarioReport {
    ScenarioReport {
        scenario,
        variant: variant.as_str(),
        created,
        delta,
    }
}

fn expect_exact<T: PartialEq + Display>(
    check: &'static str,
    expected: T,
    actual: T,
) -> HarnessResult<()> {
    if expected == actual {
        return Ok(());
    }
    Err(HarnessError::Check {
        check,
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

fn expect_at_least(check: &'static str, minimum: u64, actual: u64) -> HarnessResult<()> {
    if actual >= minimum {
        return Ok(());
    }
    Err(HarnessError::Check {
        check,
        expected: format!("at least {minimum}"),
        actual: actual.to_string(),
    })
}

fn expect_point(check: &'static str, expected: Point, actual: Option<Point>) -> HarnessResult<()> {
    match actual {
        Some(point) if point == expected => Ok(()),
        Some(point) => Err(HarnessError::Check {
            check,
            expected: expected.to_string(),
            actual: point.to_string(),
        }),
        None => Err(HarnessError::Check {
            check,
            expected: expected.to_string(),
            actual: "none".to_string(),
        }),
    }
}
