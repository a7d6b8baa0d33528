mod helpers;
mod settings;
mod weight;

pub(crate) use settings::{SettingsUpdate, cmd_settings_reset, cmd_settings_set, cmd_settings_show};
pub(crate) use weight::{
    DeleteTarget, ListOptions, cmd_weight_add, cmd_weight_delete, cmd_weight_export,
    cmd_weight_import, cmd_weight_list, cmd_weight_template, cmd_weight_update,
};
