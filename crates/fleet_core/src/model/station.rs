//! Charging stations and their per-charger resource pools.
//!
//! A station keeps one [`ChargerState`] per charger kind. Counts only change
//! through checkout/return/enqueue/dequeue so `available <= total` holds in
//! one place; a return that would overflow is an error, never clamped.

use std::collections::BTreeMap;

use h3o::CellIndex;
use im::{OrdMap, OrdSet};

use crate::error::{EntityKind, SimResult, SimulationError};

use super::energy::Charger;
use super::ids::{ChargerId, StationId};
use super::membership::Membership;
use super::position::EntityPosition;

#[derive(Debug, Clone, PartialEq)]
pub struct ChargerState {
    pub charger: Charger,
    pub total_chargers: u32,
    pub available_chargers: u32,
    pub price_per_kwh: f64,
    pub enqueued_vehicles: u32,
}

impl ChargerState {
    pub fn new(charger: Charger, count: u32) -> Self {
        Self {
            charger,
            total_chargers: count,
            available_chargers: count,
            price_per_kwh: 0.0,
            enqueued_vehicles: 0,
        }
    }

    pub fn id(&self) -> &ChargerId {
        &self.charger.id
    }

    pub fn in_use(&self) -> u32 {
        self.total_chargers - self.available_chargers
    }

    pub fn has_available(&self) -> bool {
        self.available_chargers > 0
    }

    fn owner(&self) -> String {
        format!("charger {}", self.charger.id)
    }

    pub fn add_chargers(&self, count: u32) -> Self {
        Self {
            total_chargers: self.total_chargers + count,
            available_chargers: self.available_chargers + count,
            ..self.clone()
        }
    }

    pub fn increment_available(&self) -> SimResult<Self> {
        if self.available_chargers >= self.total_chargers {
            return Err(SimulationError::ResourceOverflow {
                owner: self.owner(),
                message: format!(
                    "returning a charger would exceed total of {}",
                    self.total_chargers
                ),
            });
        }
        Ok(Self {
            available_chargers: self.available_chargers + 1,
            ..self.clone()
        })
    }

    pub fn decrement_available(&self) -> SimResult<Self> {
        if self.available_chargers == 0 {
            return Err(SimulationError::ResourceUnderflow {
                owner: self.owner(),
                message: "no chargers available".to_string(),
            });
        }
        Ok(Self {
            available_chargers: self.available_chargers - 1,
            ..self.clone()
        })
    }

    pub fn increment_enqueued(&self) -> Self {
        Self {
            enqueued_vehicles: self.enqueued_vehicles + 1,
            ..self.clone()
        }
    }

    pub fn decrement_enqueued(&self) -> SimResult<Self> {
        if self.enqueued_vehicles == 0 {
            return Err(SimulationError::ResourceUnderflow {
                owner: self.owner(),
                message: "no vehicles enqueued".to_string(),
            });
        }
        Ok(Self {
            enqueued_vehicles: self.enqueued_vehicles - 1,
            ..self.clone()
        })
    }

    /// Sets the effective rate; it cannot exceed the charger's nominal rate.
    pub fn set_charge_rate(&self, rate: f64, nominal_rate: f64) -> SimResult<Self> {
        if !(0.0..=nominal_rate).contains(&rate) {
            return Err(SimulationError::Config(format!(
                "charge rate {rate} for {} must be within [0, {nominal_rate}]",
                self.charger.id
            )));
        }
        Ok(Self {
            charger: self.charger.with_rate(rate),
            ..self.clone()
        })
    }

    pub fn scale_charge_rate(&self, factor: f64) -> SimResult<Self> {
        if !(0.0..=1.0).contains(&factor) {
            return Err(SimulationError::Config(format!(
                "charge rate factor {factor} must be within [0, 1]"
            )));
        }
        Ok(Self {
            charger: self.charger.with_rate(self.charger.rate * factor),
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: StationId,
    pub position: EntityPosition,
    pub membership: Membership,
    pub balance: f64,
    state: OrdMap<ChargerId, ChargerState>,
    on_shift_access: OrdSet<ChargerId>,
}

impl Station {
    /// A public station; every charger grants on-shift access.
    pub fn new<I>(id: StationId, position: EntityPosition, chargers: I) -> Self
    where
        I: IntoIterator<Item = (Charger, u32)>,
    {
        let station = Self {
            id,
            position,
            membership: Membership::public(),
            balance: 0.0,
            state: OrdMap::new(),
            on_shift_access: OrdSet::new(),
        };
        chargers
            .into_iter()
            .fold(station, |station, (charger, count)| {
                station.append_chargers(charger, count)
            })
    }

    pub fn cell(&self) -> CellIndex {
        self.position.cell
    }

    pub fn with_membership(&self, membership: Membership) -> Self {
        Self {
            membership,
            ..self.clone()
        }
    }

    /// Restricts on-shift access to the listed chargers.
    pub fn with_on_shift_access<I>(&self, chargers: I) -> Self
    where
        I: IntoIterator<Item = ChargerId>,
    {
        Self {
            on_shift_access: chargers.into_iter().collect(),
            ..self.clone()
        }
    }

    /// Adds `count` chargers of this kind, creating the pool when needed.
    pub fn append_chargers(&self, charger: Charger, count: u32) -> Self {
        let id = charger.id.clone();
        let updated = match self.state.get(&id) {
            Some(existing) => existing.add_chargers(count),
            None => ChargerState::new(charger, count),
        };
        Self {
            state: self.state.update(id.clone(), updated),
            on_shift_access: self.on_shift_access.update(id),
            ..self.clone()
        }
    }

    fn unknown_charger(&self, charger_id: &ChargerId) -> SimulationError {
        SimulationError::not_found(EntityKind::Charger, charger_id)
            .context(format!("station {} has no such charger", self.id))
    }

    fn update_charger_state<F>(&self, charger_id: &ChargerId, op: F) -> SimResult<Self>
    where
        F: FnOnce(&ChargerState) -> SimResult<ChargerState>,
    {
        let current = self
            .state
            .get(charger_id)
            .ok_or_else(|| self.unknown_charger(charger_id))?;
        let updated = op(current).map_err(|e| e.context(format!("station {}", self.id)))?;
        Ok(Self {
            state: self.state.update(charger_id.clone(), updated),
            ..self.clone()
        })
    }

    pub fn charger_state(&self, charger_id: &ChargerId) -> Option<&ChargerState> {
        self.state.get(charger_id)
    }

    pub fn charger_states(&self) -> impl Iterator<Item = &ChargerState> {
        self.state.values()
    }

    pub fn charger_ids(&self) -> impl Iterator<Item = &ChargerId> {
        self.state.keys()
    }

    pub fn get_charger_instance(&self, charger_id: &ChargerId) -> SimResult<&Charger> {
        self.state
            .get(charger_id)
            .map(|s| &s.charger)
            .ok_or_else(|| self.unknown_charger(charger_id))
    }

    pub fn get_price(&self, charger_id: &ChargerId) -> Option<f64> {
        self.state.get(charger_id).map(|s| s.price_per_kwh)
    }

    pub fn available_chargers(&self, charger_id: &ChargerId) -> u32 {
        self.state
            .get(charger_id)
            .map_or(0, |s| s.available_chargers)
    }

    pub fn total_chargers(&self, charger_id: &ChargerId) -> Option<u32> {
        self.state.get(charger_id).map(|s| s.total_chargers)
    }

    pub fn has_available_charger(&self, charger_id: &ChargerId) -> bool {
        self.available_chargers(charger_id) > 0
    }

    pub fn on_shift_access_chargers(&self) -> impl Iterator<Item = &ChargerId> {
        self.on_shift_access.iter()
    }

    pub fn has_on_shift_access_charger(&self, charger_id: &ChargerId) -> bool {
        self.on_shift_access.contains(charger_id)
    }

    /// Takes one charger. `Ok(None)` means none is free, which callers treat as a rejection.
    pub fn checkout_charger(&self, charger_id: &ChargerId) -> SimResult<Option<Self>> {
        let state = self
            .state
            .get(charger_id)
            .ok_or_else(|| self.unknown_charger(charger_id))?;
        if !state.has_available() {
            return Ok(None);
        }
        self.update_charger_state(charger_id, ChargerState::decrement_available)
            .map(Some)
    }

    pub fn return_charger(&self, charger_id: &ChargerId) -> SimResult<Self> {
        self.update_charger_state(charger_id, ChargerState::increment_available)
    }

    pub fn enqueue_for_charger(&self, charger_id: &ChargerId) -> SimResult<Self> {
        self.update_charger_state(charger_id, |s| Ok(s.increment_enqueued()))
    }

    pub fn dequeue_for_charger(&self, charger_id: &ChargerId) -> SimResult<Self> {
        self.update_charger_state(charger_id, ChargerState::decrement_enqueued)
    }

    pub fn enqueued_vehicle_count(&self, charger_id: &ChargerId) -> u32 {
        self.state.get(charger_id).map_or(0, |s| s.enqueued_vehicles)
    }

    pub fn set_charger_rate(&self, charger_id: &ChargerId, rate: f64, nominal_rate: f64) -> SimResult<Self> {
        self.update_charger_state(charger_id, |s| s.set_charge_rate(rate, nominal_rate))
    }

    pub fn scale_charger_rate(&self, charger_id: &ChargerId, factor: f64) -> SimResult<Self> {
        self.update_charger_state(charger_id, |s| s.scale_charge_rate(factor))
    }

    /// Applies new per-kWh prices. Chargers this station lacks are ignored.
    pub fn update_prices(&self, prices: &BTreeMap<ChargerId, f64>) -> Self {
        let state = prices
            .iter()
            .fold(self.state.clone(), |state, (charger_id, price)| {
                match state.get(charger_id) {
                    Some(current) => {
                        let updated = ChargerState {
                            price_per_kwh: *price,
                            ..current.clone()
                        };
                        state.update(charger_id.clone(), updated)
                    }
                    None => state,
                }
            });
        Self {
            state,
            ..self.clone()
        }
    }

    pub fn receive_payment(&self, amount: f64) -> Self {
        Self {
            balance: self.balance + amount,
            ..self.clone()
        }
    }
}
