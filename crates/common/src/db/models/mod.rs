//! SeaORM entity models
//!
//! Tables behind the run store

mod run;
mod score_record;
mod sent_item;

pub use run::{
    Entity as RunEntity,
    Model as Run,
    ActiveModel as RunActiveModel,
    Column as RunColumn,
};

pub use score_record::{
    Entity as ScoreRecordEntity,
    Model as ScoreRecordRow,
    ActiveModel as ScoreRecordActiveModel,
    Column as ScoreRecordColumn,
};

pub use sent_item::{
    Entity as SentItemEntity,
    Model as SentItem,
    ActiveModel as SentItemActiveModel,
    Column as SentItemColumn,
};
