//! Electricity price models.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::core::config::{parse_config_value, parse_options};

/// Hour-of-day bucket of an epoch timestamp.
pub fn hour_of_day(timestamp: f64) -> usize {
    ((timestamp / 3600.) as u64 % 24) as usize
}

/// Seconds left until the next full hour starts.
pub fn seconds_until_next_hour(timestamp: f64) -> f64 {
    3600. - timestamp.rem_euclid(3600.)
}

/// Price source consumed by the price-aware schedulers and the reporters.
///
/// Prices are per kWh; energy costs integrate a constant power draw in watts
/// over an interval of epoch seconds.
pub trait EnergyCostModel {
    /// Anchors models that index prices relative to the simulation start.
    fn init_timestamp(&mut self, _start_time: f64) {}

    /// Hourly price effective at the given timestamp.
    fn timestamp_price(&self, timestamp: f64) -> f64;

    /// Cost of drawing `power` watts from `start_time` to `end_time`.
    fn energy_costs(&self, start_time: f64, end_time: f64, power: f64) -> f64;

    /// Extra charges derived from the observed power corridor, zero by default.
    fn fixed_penalties(&self, _min_power: f64, _max_power: f64) -> f64 {
        0.
    }
}

pub fn energy_model_resolver(config_str: &str) -> Rc<RefCell<dyn EnergyCostModel>> {
    let (name, options) = parse_config_value(config_str);
    match name.as_str() {
        "FixedPrice" => Rc::new(RefCell::new(FixedPriceModel::new())),
        "DayNightPrice" => Rc::new(RefCell::new(HourlyPriceModel::day_night())),
        "HourlyStockPrice" => {
            let options = parse_options(&options.unwrap_or_default());
            let file = options
                .get("file")
                .unwrap_or_else(|| panic!("HourlyStockPrice needs a file option: {}", config_str));
            Rc::new(RefCell::new(HourlyStockPriceModel::from_file(file)))
        }
        _ => panic!("Can't resolve energy model: {}", config_str),
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Flat tariff: the same price at every hour.
pub struct FixedPriceModel {
    price_per_kwh: f64,
}

impl FixedPriceModel {
    pub fn new() -> Self {
        Self { price_per_kwh: 0.145 }
    }

    pub fn with_price(price_per_kwh: f64) -> Self {
        Self { price_per_kwh }
    }
}

impl Default for FixedPriceModel {
    fn default() -> Self {
        Self::new()
    }
}

impl EnergyCostModel for FixedPriceModel {
    fn timestamp_price(&self, _timestamp: f64) -> f64 {
        self.price_per_kwh
    }

    fn energy_costs(&self, start_time: f64, end_time: f64, power: f64) -> f64 {
        (end_time - start_time) * power * self.price_per_kwh / 1000. / 3600.
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Tariff with one price per hour of the day.
pub struct HourlyPriceModel {
    price: [f64; 24],
}

impl HourlyPriceModel {
    pub fn new(price: [f64; 24]) -> Self {
        Self { price }
    }

    /// The common two-level tariff: cheap at night, expensive between 6:00
    /// and 22:00.
    pub fn day_night() -> Self {
        let mut price = [0.1; 24];
        for slot in price.iter_mut().take(22).skip(6) {
            *slot = 0.16675;
        }
        Self { price }
    }
}

impl EnergyCostModel for HourlyPriceModel {
    fn timestamp_price(&self, timestamp: f64) -> f64 {
        self.price[hour_of_day(timestamp)]
    }

    fn energy_costs(&self, start_time: f64, end_time: f64, power: f64) -> f64 {
        let mut duration = end_time - start_time;
        let first_span = seconds_until_next_hour(start_time);
        let mut costs;
        if first_span < duration {
            duration -= first_span;
            let mut hour = hour_of_day(start_time);
            costs = self.price[hour] * power * first_span;
            let full_hours = (duration / 3600.) as u64;
            for _ in 0..full_hours {
                hour = (hour + 1) % 24;
                costs += self.price[hour] * power * 3600.;
            }
            hour = (hour + 1) % 24;
            costs += self.price[hour] * power * (duration % 3600.);
        } else {
            costs = self.price[hour_of_day(start_time)] * power * duration;
        }
        assert!(costs >= 0.);
        costs / 1000. / 3600.
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Market prices read from a CSV file with one row per hour of the
/// simulation, anchored at the first simulated timestamp.
pub struct HourlyStockPriceModel {
    first_time: f64,
    price: HashMap<i64, f64>,
}

impl HourlyStockPriceModel {
    /// Reads the price table from a CSV file with an index column and a
    /// `price` column.
    pub fn from_file(file_name: &str) -> Self {
        let mut reader =
            csv::Reader::from_path(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name));
        let headers = reader
            .headers()
            .unwrap_or_else(|e| panic!("Can't parse header of {}: {}", file_name, e))
            .clone();
        let price_column = headers
            .iter()
            .position(|h| h == "price")
            .unwrap_or_else(|| panic!("No price column in {}", file_name));
        let mut price = HashMap::new();
        for record in reader.records() {
            let record = record.unwrap_or_else(|e| panic!("Bad record in {}: {}", file_name, e));
            let slot: i64 = record[0].parse().unwrap_or_else(|_| panic!("Bad hour index: {}", &record[0]));
            let value: f64 = record[price_column]
                .parse()
                .unwrap_or_else(|_| panic!("Bad price: {}", &record[price_column]));
            price.insert(slot, value);
        }
        Self { first_time: 0., price }
    }

    /// Builds the model from an in-memory table, hour slots starting at 1.
    pub fn from_prices(prices: &[f64]) -> Self {
        Self {
            first_time: 0.,
            price: prices.iter().enumerate().map(|(i, p)| (i as i64 + 1, *p)).collect(),
        }
    }

    fn slot(&self, timestamp: f64) -> i64 {
        ((timestamp - self.first_time) / 3600.) as i64 + 1
    }

    fn price_at(&self, slot: i64) -> f64 {
        *self
            .price
            .get(&slot)
            .unwrap_or_else(|| panic!("No price for hour slot {}", slot))
    }
}

impl EnergyCostModel for HourlyStockPriceModel {
    fn init_timestamp(&mut self, start_time: f64) {
        self.first_time = start_time;
    }

    fn timestamp_price(&self, timestamp: f64) -> f64 {
        self.price_at(self.slot(timestamp))
    }

    fn energy_costs(&self, start_time: f64, end_time: f64, power: f64) -> f64 {
        assert!(power >= 0.);
        let mut duration = end_time - start_time;
        assert!(duration > 0.);
        let mut slot = self.slot(start_time);
        let first_span = seconds_until_next_hour(start_time);
        let mut costs;
        if first_span < duration {
            duration -= first_span;
            costs = self.price_at(slot) * power * first_span;
            let full_hours = (duration / 3600.) as u64;
            for _ in 0..full_hours {
                slot += 1;
                costs += self.price_at(slot) * power * 3600.;
            }
            slot += 1;
            costs += self.price_at(slot) * power * (duration % 3600.);
        } else {
            costs = self.price_at(slot) * power * duration;
        }
        costs / 1000. / 3600.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_arithmetic() {
        assert_eq!(hour_of_day(0.), 0);
        assert_eq!(hour_of_day(3600. * 25.), 1);
        assert_eq!(seconds_until_next_hour(0.), 3600.);
        assert_eq!(seconds_until_next_hour(3500.), 100.);
    }

    #[test]
    fn test_fixed_price_costs() {
        let model = FixedPriceModel::with_price(0.2);
        // 1 kW over one hour costs exactly one price unit times 0.2
        let costs = model.energy_costs(0., 3600., 1000.);
        assert!((costs - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_hourly_price_crosses_buckets() {
        let mut price = [1.; 24];
        price[1] = 2.;
        let model = HourlyPriceModel::new(price);
        // 1800 s in hour 0 at price 1 plus 1800 s in hour 1 at price 2,
        // with 1000 W: (1800 + 3600) * 1000 / 1000 / 3600
        let costs = model.energy_costs(1800., 5400., 1000.);
        assert!((costs - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_stock_price_slots() {
        let mut model = HourlyStockPriceModel::from_prices(&[0.1, 0.2, 0.3]);
        model.init_timestamp(7200.);
        assert_eq!(model.timestamp_price(7200.), 0.1);
        assert_eq!(model.timestamp_price(7200. + 3600.), 0.2);
        assert_eq!(model.timestamp_price(7200. + 2. * 3600.), 0.3);
    }
}
