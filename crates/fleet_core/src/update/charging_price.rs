use std::collections::{BTreeMap, VecDeque};

use h3o::CellIndex;
use tracing::{debug, warn};

use crate::clock::SimTime;
use crate::environment::Environment;
use crate::error::SimResult;
use crate::model::{ChargerId, Station, StationId};
use crate::world::World;

use super::SimulationUpdate;

/// Which stations a price row applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceTarget {
    /// Every station.
    Default,
    Station(StationId),
    /// Every station located in this cell or one of its descendants.
    Cell(CellIndex),
}

/// One timed price change, effective from `time` onwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub time: SimTime,
    pub target: PriceTarget,
    pub charger_id: ChargerId,
    pub price_per_kwh: f64,
}

impl PriceRow {
    pub fn new(time: SimTime, target: PriceTarget, charger_id: ChargerId, price_per_kwh: f64) -> Self {
        Self {
            time,
            target,
            charger_id,
            price_per_kwh,
        }
    }
}

/// Applies charging prices once the clock reaches each row's time.
///
/// Rows that became due in the same step are folded so the latest row per
/// target and charger wins. Station prices are then layered: default rows
/// first, cell rows over them, station rows last.
#[derive(Debug, Clone, Default)]
pub struct ChargingPriceUpdate {
    pending: VecDeque<PriceRow>,
}

type PriceTable = BTreeMap<ChargerId, f64>;

#[derive(Debug, Default)]
struct DueRows {
    default: PriceTable,
    cells: BTreeMap<CellIndex, PriceTable>,
    stations: BTreeMap<StationId, PriceTable>,
}

impl DueRows {
    fn is_empty(&self) -> bool {
        self.default.is_empty() && self.cells.is_empty() && self.stations.is_empty()
    }

    fn prices_for(&self, station: &Station) -> PriceTable {
        let mut prices = self.default.clone();
        let station_cell = station.cell();
        for (cell, table) in &self.cells {
            let covers = station_cell
                .parent(cell.resolution())
                .map_or(false, |parent| parent == *cell);
            if covers {
                prices.extend(table.iter().map(|(k, v)| (k.clone(), *v)));
            }
        }
        if let Some(table) = self.stations.get(&station.id) {
            prices.extend(table.iter().map(|(k, v)| (k.clone(), *v)));
        }
        prices
    }
}

impl ChargingPriceUpdate {
    pub fn new(rows: Vec<PriceRow>) -> Self {
        let mut rows = rows;
        // stable: rows sharing a time keep their input order
        rows.sort_by_key(|row| row.time);
        Self {
            pending: rows.into(),
        }
    }

    /// Zero price for every listed charger, effective immediately.
    pub fn zero_prices<'a, I>(charger_ids: I) -> Self
    where
        I: IntoIterator<Item = &'a ChargerId>,
    {
        let rows = charger_ids
            .into_iter()
            .map(|id| PriceRow::new(0, PriceTarget::Default, id.clone(), 0.0))
            .collect();
        Self::new(rows)
    }

    pub fn pending_rows(&self) -> usize {
        self.pending.len()
    }

    fn take_due(&mut self, now: SimTime) -> DueRows {
        let mut due = DueRows::default();
        while self.pending.front().map_or(false, |row| row.time <= now) {
            let Some(row) = self.pending.pop_front() else {
                break;
            };
            if !row.price_per_kwh.is_finite() || row.price_per_kwh < 0.0 {
                warn!(charger_id = %row.charger_id, price = row.price_per_kwh, "ignoring invalid charging price");
                continue;
            }
            let table = match row.target {
                PriceTarget::Default => &mut due.default,
                PriceTarget::Cell(cell) => due.cells.entry(cell).or_default(),
                PriceTarget::Station(station_id) => due.stations.entry(station_id).or_default(),
            };
            table.insert(row.charger_id, row.price_per_kwh);
        }
        due
    }
}

impl SimulationUpdate for ChargingPriceUpdate {
    fn name(&self) -> &str {
        "charging_price_update"
    }

    fn update(&mut self, world: &World, _env: &Environment) -> SimResult<World> {
        let due = self.take_due(world.sim_time());
        if due.is_empty() {
            return Ok(world.clone());
        }
        for station_id in due.stations.keys() {
            if world.station(station_id).is_none() {
                debug!(%station_id, "price row for unknown station ignored");
            }
        }
        let mut next = world.clone();
        for station in world.stations().values() {
            let prices = due.prices_for(station);
            if prices.is_empty() {
                continue;
            }
            next = next.modify_station(station.update_prices(&prices))?;
        }
        Ok(next)
    }
}
