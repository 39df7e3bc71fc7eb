//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod activity_entry;
pub mod expense;
pub mod payment;
pub mod profile;
pub mod project;
pub mod project_comment;
pub mod project_file;
pub mod role;
pub mod stage;
pub mod sub_stage;
pub mod sub_stage_detail;
pub mod system_state;

// Re-export specific types to avoid conflicts
pub use activity_entry::{
    ActivityType, Column as ActivityEntryColumn, Entity as ActivityEntry,
    Model as ActivityEntryModel,
};
pub use expense::{Column as ExpenseColumn, Entity as Expense, Model as ExpenseModel};
pub use payment::{Column as PaymentColumn, Entity as Payment, Model as PaymentModel};
pub use profile::{Column as ProfileColumn, Entity as Profile, Model as ProfileModel};
pub use project::{Column as ProjectColumn, Entity as Project, Model as ProjectModel};
pub use project_comment::{
    Column as ProjectCommentColumn, Entity as ProjectComment, Model as ProjectCommentModel,
};
pub use project_file::{
    Column as ProjectFileColumn, Entity as ProjectFile, Model as ProjectFileModel,
};
pub use role::{Column as RoleColumn, Entity as Role, Model as RoleModel};
pub use stage::{Column as StageColumn, Entity as Stage, Model as StageModel};
pub use sub_stage::{Column as SubStageColumn, Entity as SubStage, Model as SubStageModel};
pub use sub_stage_detail::{
    Column as SubStageDetailColumn, Entity as SubStageDetail, Model as SubStageDetailModel,
};
pub use system_state::{
    Column as SystemStateColumn, Entity as SystemState, Model as SystemStateModel,
};
