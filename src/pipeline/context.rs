use super::protocol::RunProtocol;
use crate::config::{RunConfig, UnitConfig};
use crate::error::SpiError;
use crate::models::Value;
use crate::store::{Store, Table};

/// State shared by the steps of one run.
///
/// The store is dropped before the protocol, so the connection is released
/// before the protocol's closing line is written, on every exit path.
pub struct RunContext {
    pub unit: UnitConfig,
    pub run: RunConfig,
    pub store: Box<dyn Store>,
    pub protocol: RunProtocol,
    plan: Option<i64>,
}

impl RunContext {
    pub fn new(unit: UnitConfig, run: RunConfig, store: Box<dyn Store>, protocol: RunProtocol) -> Self {
        Self {
            unit,
            run,
            store,
            protocol,
            plan: None,
        }
    }

    pub fn debug(&self) -> bool {
        self.protocol.is_debug()
    }

    pub(crate) fn set_plan_id(&mut self, plan: i64) {
        self.plan = Some(plan);
    }

    /// Id of the unit's plan, looked up by natural keys on first use.
    pub fn plan_id(&mut self) -> Result<i64, SpiError> {
        if let Some(plan) = self.plan {
            return Ok(plan);
        }
        let not_initialized = || {
            SpiError::StoreError(format!(
                "Plan {} of unit {} is not initialized; enable the unit initialization",
                self.unit.plan_valid_from, self.unit.code
            ))
        };

        let company = self
            .store
            .find(Table::Company, &[("registration", self.unit.company_id.as_str().into())])?
            .ok_or_else(not_initialized)?;
        let unit = self
            .store
            .find(
                Table::Unit,
                &[("company_id", company.into()), ("code", self.unit.code.as_str().into())],
            )?
            .ok_or_else(not_initialized)?;
        let plan = self
            .store
            .find(
                Table::Plan,
                &[
                    ("unit_id", unit.into()),
                    ("valid_from", Value::Text(self.unit.plan_valid_from.to_string())),
                ],
            )?
            .ok_or_else(not_initialized)?;

        self.plan = Some(plan);
        Ok(plan)
    }
}
