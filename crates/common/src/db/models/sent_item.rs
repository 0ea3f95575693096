//! Delivered item keyed by its canonical key

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sent_items")]
pub struct Model {
    /// Rendered canonical key, e.g. `DOI:10.1038/x`
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub key: String,

    pub run_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub origin: String,

    #[sea_orm(column_type = "Double")]
    pub score: f64,

    #[sea_orm(column_type = "Text")]
    pub tier: String,

    pub sent_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::run::Entity",
        from = "Column::RunId",
        to = "super::run::Column::Id"
    )]
    Run,
}

impl Related<super::run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Run.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
