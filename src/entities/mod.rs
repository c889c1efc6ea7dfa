pub mod consumption_record;
pub mod stock_record;

pub use consumption_record::{
    ConsumptionFilter, ConsumptionRecord, ConsumptionRecordPatch, LogConsumptionRequest,
    NewConsumptionRecord,
};
pub use stock_record::{FoodCategory, NewStockRecord, StockRecord, StockRecordPatch};
