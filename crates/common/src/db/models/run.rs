//! One execution of the pipeline

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub window_days: i64,

    /// A `RunStatus`, or `failed` when a storage error stopped the run;
    /// null while the run is in progress
    #[sea_orm(column_type = "Text", nullable)]
    pub status: Option<String>,

    pub total_items: i32,

    pub unseen_items: i32,

    pub selected_items: i32,

    pub started_at: DateTimeWithTimeZone,

    pub finished_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sent_item::Entity")]
    SentItems,

    #[sea_orm(has_many = "super::score_record::Entity")]
    ScoreRecords,
}

impl Related<super::sent_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SentItems.def()
    }
}

impl Related<super::score_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScoreRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
