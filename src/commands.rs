//! # Control Surface
//!
//! Named commands and getters exposed over the cloud transport. Every
//! command takes one comma-separated argument string and answers `1`
//! on success or a small negative code identifying the validation step
//! that failed; getters answer a JSON string or an
//! `{"error":"<message>"}` envelope. No error type ever crosses this
//! boundary as anything but a value.
//!
//! The transport itself (remote registration, the publish channel) is
//! external; the gateway only consumes the [`Transport`] seam.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::constants::{
    is_read_function, is_write_function, ARGS_MAX, GETTER_JSON_MAX, MAX_SLAVE_ADDR, MAX_TOKENS_NUM,
};
use crate::batch::PublishBatch;
use crate::descriptor::{is_valid_register_name, RegisterDescriptor, RegisterType};
use crate::error::{RegisterError, Width};
use crate::gateway::GatewayCore;
use crate::link::{DataBits, LinkConfig, Parity, StopBits};
use crate::parse;
use crate::words::WordOrder;

/// Handler for a named mutation command.
pub type CommandHandler = Box<dyn Fn(String) -> BoxFuture<'static, i32> + Send + Sync>;

/// Handler for a named JSON getter.
pub type GetterHandler = Box<dyn Fn(String) -> BoxFuture<'static, String> + Send + Sync>;

/// Cloud control-plane seam consumed by the gateway.
///
/// Registration happens once at bring-up; `publish` is shared with the
/// polling engine for batch and diagnostic emissions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Register a named command, callable by every user.
    fn register_command(&self, name: &'static str, handler: CommandHandler);

    /// Register a named getter returning JSON.
    fn register_getter(&self, name: &'static str, handler: GetterHandler);

    /// Publish a payload on a topic. True when the transport accepted it.
    async fn publish(&self, topic: &str, payload: &str) -> bool;
}

fn json_error(message: &str) -> String {
    format!("{{\"error\":\"{}\"}}", message)
}

fn word_order_token(order: WordOrder) -> &'static str {
    match order {
        WordOrder::MsbFirst => "msb",
        WordOrder::LsbFirst => "lsb",
    }
}

/// Shared prologue of the `name,value` commands: length check, split,
/// exact arity of two. Failures carry the command exit code.
fn two_tokens(args: &str) -> Result<(&str, &str), i32> {
    if args.len() >= ARGS_MAX {
        return Err(-1);
    }
    let tokens = parse::split_args(args, MAX_TOKENS_NUM).map_err(|_| -2)?;
    if tokens.len() != 2 {
        return Err(-4);
    }
    Ok((tokens[0], tokens[1]))
}

// ============================================================================
// Mutation Commands
// ============================================================================

fn post_add_register(core: &GatewayCore, args: &str) -> i32 {
    if args.len() >= ARGS_MAX {
        return -1;
    }
    let tokens = match parse::split_args(args, MAX_TOKENS_NUM) {
        Ok(tokens) => tokens,
        Err(_) => return -2,
    };
    if tokens.len() != 5 {
        return -4;
    }
    if !is_valid_register_name(tokens[0]) {
        return -5;
    }
    let read_function = match parse::parse_unsigned::<u8>(tokens[1]) {
        Some(function) if is_read_function(function) => function,
        _ => return -6,
    };
    let slave_addr = match parse::parse_unsigned::<u8>(tokens[2]) {
        Some(addr) if (1..=MAX_SLAVE_ADDR).contains(&addr) => addr,
        _ => return -7,
    };
    let reg_id = match parse::parse_unsigned::<u16>(tokens[3]) {
        Some(reg) => reg,
        None => return -8,
    };
    let ty = match RegisterType::from_str(tokens[4]) {
        Some(ty) => ty,
        None => return -9,
    };

    let desc = RegisterDescriptor::new(tokens[0], read_function, slave_addr, reg_id, ty);
    match core.catalog().add(desc) {
        Ok(()) => 1,
        Err(_) => -10,
    }
}

fn post_delete_register(core: &GatewayCore, args: &str) -> i32 {
    if core.catalog().remove(args) {
        1
    } else {
        -1
    }
}

fn post_monitor_register(core: &GatewayCore, args: &str) -> i32 {
    let (name, token) = match two_tokens(args) {
        Ok(tokens) => tokens,
        Err(code) => return code,
    };
    let monitored = match parse::parse_bool(token) {
        Some(flag) => flag,
        None => return -5,
    };
    if core.catalog().set_monitored(name, monitored) {
        1
    } else {
        -6
    }
}

fn post_enable_monitor_on_change(core: &GatewayCore, args: &str) -> i32 {
    let (name, token) = match two_tokens(args) {
        Ok(tokens) => tokens,
        Err(code) => return code,
    };
    let on_change = match parse::parse_bool(token) {
        Some(flag) => flag,
        None => return -5,
    };
    if core.catalog().set_on_change(name, on_change) {
        1
    } else {
        -6
    }
}

fn post_set_register_change_check_interval(core: &GatewayCore, args: &str) -> i32 {
    let (name, token) = match two_tokens(args) {
        Ok(tokens) => tokens,
        Err(code) => return code,
    };
    let interval = match parse::parse_unsigned::<u32>(token) {
        Some(seconds) => seconds,
        None => return -5,
    };
    if core.catalog().set_change_check_interval(name, interval) {
        1
    } else {
        -6
    }
}

fn post_set_register_max_publish_delay(core: &GatewayCore, args: &str) -> i32 {
    let (name, token) = match two_tokens(args) {
        Ok(tokens) => tokens,
        Err(code) => return code,
    };
    let delay = match parse::parse_unsigned::<u32>(token) {
        Some(seconds) => seconds,
        None => return -5,
    };
    if core.catalog().set_max_publish_delay(name, delay) {
        1
    } else {
        -6
    }
}

fn post_make_register_writable(core: &GatewayCore, args: &str) -> i32 {
    if args.len() >= ARGS_MAX {
        return -1;
    }
    let tokens = match parse::split_args(args, MAX_TOKENS_NUM) {
        Ok(tokens) => tokens,
        Err(_) => return -2,
    };
    if tokens.len() != 2 && tokens.len() != 3 {
        return -4;
    }
    let writable = match parse::parse_bool(tokens[1]) {
        Some(flag) => flag,
        None => return -5,
    };

    let write_function = if writable {
        match tokens.get(2).copied().and_then(parse::parse_unsigned::<u8>) {
            Some(function) if is_write_function(function) => function,
            _ => return -6,
        }
    } else {
        // A write function makes no sense on a non-writable register.
        if tokens.len() == 3 {
            return -7;
        }
        0
    };

    if core.catalog().set_writable(tokens[0], writable, write_function) {
        1
    } else {
        -8
    }
}

fn post_make_register_signed(core: &GatewayCore, args: &str) -> i32 {
    let (name, token) = match two_tokens(args) {
        Ok(tokens) => tokens,
        Err(code) => return code,
    };
    let signed = match parse::parse_bool(token) {
        Some(flag) => flag,
        None => return -5,
    };
    if core.catalog().set_interpret_as_signed(name, signed) {
        1
    } else {
        -6
    }
}

fn post_set_register_coefficients(core: &GatewayCore, args: &str) -> i32 {
    if args.len() >= ARGS_MAX {
        return -1;
    }
    let tokens = match parse::split_args(args, MAX_TOKENS_NUM) {
        Ok(tokens) => tokens,
        Err(_) => return -2,
    };
    if tokens.len() != 3 {
        return -4;
    }
    let factor = match parse::parse_decimal(tokens[1]) {
        Some(value) => value,
        None => return -5,
    };
    let offset = match parse::parse_decimal(tokens[2]) {
        Some(value) => value,
        None => return -6,
    };

    let mut catalog = core.catalog();
    if !catalog.set_factor(tokens[0], factor) {
        return -7;
    }
    if !catalog.set_offset(tokens[0], offset) {
        return -8;
    }
    1
}

fn post_set_register_decimals(core: &GatewayCore, args: &str) -> i32 {
    let (name, token) = match two_tokens(args) {
        Ok(tokens) => tokens,
        Err(code) => return code,
    };
    let decimals = match parse::parse_unsigned::<u8>(token) {
        Some(value) => value,
        None => return -5,
    };
    if core.catalog().set_decimals(name, decimals) {
        1
    } else {
        -6
    }
}

fn post_set_register_length(core: &GatewayCore, args: &str) -> i32 {
    let (name, token) = match two_tokens(args) {
        Ok(tokens) => tokens,
        Err(code) => return code,
    };
    let words = match parse::parse_unsigned::<u8>(token) {
        Some(value) => value,
        None => return -5,
    };
    if core.catalog().set_word_count(name, words) {
        1
    } else {
        -6
    }
}

fn post_set_mb_config(core: &GatewayCore, args: &str) -> i32 {
    if args.len() >= ARGS_MAX {
        return -1;
    }
    let tokens = match parse::split_args(args, MAX_TOKENS_NUM) {
        Ok(tokens) => tokens,
        Err(_) => return -2,
    };
    if tokens.is_empty() {
        return -4;
    }

    let baudrate = match parse::parse_unsigned::<i32>(tokens[0]) {
        Some(baud) => baud,
        None => return -5,
    };
    if !core.config().set_baudrate(baudrate) {
        return -5;
    }

    if tokens.len() >= 2 {
        let data_bits = match parse::parse_unsigned::<u8>(tokens[1]).and_then(DataBits::from_bit_count)
        {
            Some(bits) => bits,
            None => return -6,
        };
        core.config().set_data_bits(data_bits);

        if tokens.len() >= 3 {
            let parity = match Parity::from_str(tokens[2]) {
                Some(parity) => parity,
                None => return -7,
            };
            core.config().set_parity(parity);

            if tokens.len() >= 4 {
                let stop_bits = match parse::parse_decimal(tokens[3]).and_then(StopBits::from_f64) {
                    Some(bits) => bits,
                    None => return -8,
                };
                core.config().set_stop_bits(stop_bits);
            }
        }
    }

    1
}

fn post_set_mb_inter_cmds_delay_ms(core: &GatewayCore, args: &str) -> i32 {
    let delay = match parse::parse_unsigned::<u16>(args) {
        Some(value) => value,
        None => return -1,
    };
    if core.config().set_inter_cmd_delay_ms(delay) {
        1
    } else {
        -2
    }
}

fn post_set_mb_read_period(core: &GatewayCore, args: &str) -> i32 {
    let period = match parse::parse_unsigned::<u8>(args) {
        Some(value) => value,
        None => return -1,
    };
    core.config().set_read_period(period);
    1
}

fn post_set_mb_word_order(core: &GatewayCore, args: &str) -> i32 {
    let order = match args {
        "msb" => WordOrder::MsbFirst,
        "lsb" => WordOrder::LsbFirst,
        _ => return -1,
    };
    core.config().set_word_order(order);
    1
}

fn post_save_config_to_flash(core: &GatewayCore, _args: &str) -> i32 {
    if core.save_config_to_flash() {
        1
    } else {
        -1
    }
}

async fn post_write_register_value(core: &GatewayCore, args: &str) -> i32 {
    let (name, value) = match two_tokens(args) {
        Ok(tokens) => tokens,
        Err(code) => return code,
    };

    match core.write_typed_register_by_name(name, value).await {
        Ok(()) => 1,
        Err(RegisterError::NotFound) => -5,
        Err(RegisterError::NotInitialized) => -6,
        Err(RegisterError::NotWritable) => -7,
        Err(RegisterError::BusWrite) => -8,
        Err(RegisterError::NotANumber) => -9,
        Err(RegisterError::CannotRepresent(Width::Int16)) => -10,
        Err(RegisterError::CannotRepresent(Width::Uint16)) => -11,
        Err(_) => -12,
    }
}

async fn post_write_raw_register_value(core: &GatewayCore, args: &str) -> i32 {
    if args.len() >= ARGS_MAX {
        return -1;
    }
    let tokens = match parse::split_args(args, MAX_TOKENS_NUM) {
        Ok(tokens) => tokens,
        Err(_) => return -2,
    };
    if tokens.len() != 4 {
        return -4;
    }
    let write_function = match parse::parse_unsigned::<u8>(tokens[0]) {
        Some(function) if is_write_function(function) => function,
        _ => return -5,
    };
    let slave_addr = match parse::parse_unsigned::<u8>(tokens[1]) {
        Some(addr) => addr,
        None => return -6,
    };
    let reg_id = match parse::parse_unsigned::<u16>(tokens[2]) {
        Some(reg) => reg,
        None => return -7,
    };
    let value = match parse::parse_unsigned::<u16>(tokens[3]) {
        Some(value) => value,
        None => return -8,
    };

    match core
        .write_raw_register(write_function, slave_addr, reg_id, value)
        .await
    {
        Ok(()) => 1,
        Err(RegisterError::NotInitialized) => -9,
        Err(RegisterError::BusWrite) => -10,
        Err(_) => -11,
    }
}

// ============================================================================
// Getters
// ============================================================================

fn get_registers_list(core: &GatewayCore) -> String {
    let catalog = core.catalog();
    let mut json = String::from("[");
    for index in 0..catalog.count() {
        if let Some(desc) = catalog.at(index) {
            if index > 0 {
                json.push(',');
            }
            let _ = write!(json, "\"{}\"", desc.name);
        }
    }
    json.push(']');
    json
}

fn get_register_details(core: &GatewayCore, args: &str) -> String {
    let mut json = String::from("{");
    if let Some(desc) = core.catalog().find(args) {
        let _ = write!(json, "\"name\":\"{}\",", desc.name);
        let _ = write!(json, "\"address\":{},", desc.slave_addr);
        let _ = write!(json, "\"register\":{},", desc.reg_id);
        let _ = write!(json, "\"readFunction\":{},", desc.read_function);
        let _ = write!(json, "\"type\":\"{}\",", desc.ty.as_str());
        match desc.ty {
            RegisterType::Number => {
                let _ = write!(json, "\"signed\":{},", desc.interpret_as_signed);
                let _ = write!(json, "\"factor\":{:?},", desc.factor);
                let _ = write!(json, "\"offset\":{:?},", desc.offset);
                let _ = write!(json, "\"decimals\":{},", desc.decimals);
            }
            RegisterType::Float => {
                let _ = write!(json, "\"factor\":{:?},", desc.factor);
                let _ = write!(json, "\"offset\":{:?},", desc.offset);
                let _ = write!(json, "\"decimals\":{},", desc.decimals);
            }
            RegisterType::Str => {
                let _ = write!(json, "\"length\":{},", desc.word_count);
            }
            RegisterType::Raw => {}
        }
        let _ = write!(json, "\"monitored\":{},", desc.monitored);
        if desc.monitored {
            let _ = write!(json, "\"maxPublishDelay\":{},", desc.max_publish_delay_s);
            let _ = write!(json, "\"publishOnChange\":{},", desc.publish_on_change);
            if desc.publish_on_change {
                let _ = write!(json, "\"changeCheckInterval\":{},", desc.change_check_interval_s);
            }
        }
        let _ = write!(json, "\"writable\":{}", desc.writable);
        if desc.writable {
            let _ = write!(json, ",\"writeFunction\":{}", desc.write_function);
        }
    }
    json.push('}');
    json
}

fn get_register_name_by_mb_details(core: &GatewayCore, args: &str) -> String {
    if args.len() >= ARGS_MAX {
        return json_error("arg too long");
    }
    let tokens = match parse::split_args(args, MAX_TOKENS_NUM) {
        Ok(tokens) => tokens,
        Err(_) => return json_error("too many parameters"),
    };
    if tokens.len() != 3 {
        return json_error("wrong number of parameters");
    }
    let read_function = match parse::parse_unsigned::<u8>(tokens[0]) {
        Some(function) if is_read_function(function) => function,
        _ => return json_error("invalid read function"),
    };
    let slave_addr = match parse::parse_unsigned::<u8>(tokens[1]) {
        Some(addr) => addr,
        None => return json_error("invalid slave address"),
    };
    let reg_id = match parse::parse_unsigned::<u16>(tokens[2]) {
        Some(reg) => reg,
        None => return json_error("invalid register index"),
    };

    let mut json = String::from("{");
    if let Some(desc) = core.catalog().find_by_modbus(read_function, slave_addr, reg_id) {
        let _ = write!(json, "\"name\":\"{}\",", desc.name);
        let _ = write!(json, "\"address\":{},", desc.slave_addr);
        let _ = write!(json, "\"register\":{}", desc.reg_id);
    }
    json.push('}');
    json
}

fn render_link_config(config: &LinkConfig, running: Option<bool>) -> String {
    let mut json = String::from("{");
    if let Some(running) = running {
        let _ = write!(json, "\"running\":{},", running);
    }
    let _ = write!(json, "\"interCmdsDelayMs\":{},", config.inter_cmd_delay_ms);
    let _ = write!(json, "\"baudrate\":{},", config.baudrate);
    let _ = write!(json, "\"readPeriod\":{},", config.read_period_s);
    let _ = write!(json, "\"dataBits\":{},", config.data_bits.bit_count());
    let _ = write!(json, "\"stopBits\":{:.2},", config.stop_bits.as_f64());
    let _ = write!(json, "\"parity\":\"{}\",", config.parity.as_str());
    let _ = write!(json, "\"wordOrder\":\"{}\"", word_order_token(config.word_order));
    json.push('}');
    json
}

fn get_actual_modbus_config(core: &GatewayCore) -> String {
    render_link_config(&core.config().actual(), Some(core.is_started()))
}

fn get_next_modbus_config(core: &GatewayCore) -> String {
    render_link_config(&core.config().next(), None)
}

async fn get_read_register_value(core: &GatewayCore, args: &str) -> String {
    match core.read_typed_register_by_name(args).await {
        Ok(value) => format!("{{\"name\":\"{}\",\"value\":{}}}", args, value),
        Err(_) => String::from("{}"),
    }
}

async fn get_read_raw_register_value(core: &GatewayCore, args: &str) -> String {
    if args.len() >= ARGS_MAX {
        return json_error("arg too long");
    }
    let tokens = match parse::split_args(args, MAX_TOKENS_NUM) {
        Ok(tokens) => tokens,
        Err(_) => return json_error("too many parameters"),
    };
    if tokens.len() != 3 {
        return json_error("wrong number of parameters");
    }
    let read_function = match parse::parse_unsigned::<u8>(tokens[0]) {
        Some(function) if is_read_function(function) => function,
        _ => return json_error("invalid read function"),
    };
    let slave_addr = match parse::parse_unsigned::<u8>(tokens[1]) {
        Some(addr) => addr,
        None => return json_error("invalid slave address"),
    };
    let reg_id = match parse::parse_unsigned::<u16>(tokens[2]) {
        Some(reg) => reg,
        None => return json_error("invalid register index"),
    };

    match core.read_raw_register(read_function, slave_addr, reg_id).await {
        Ok(value) => format!(
            "{{\"readFunction\":{},\"address\":{},\"register\":{},\"value\":{}}}",
            read_function, slave_addr, reg_id, value
        ),
        Err(RegisterError::NotInitialized) => json_error("modbus not running"),
        Err(RegisterError::BusRead) => json_error("modbus read failed"),
        Err(_) => json_error("internal error"),
    }
}

async fn get_read_all_registers_values(core: &GatewayCore) -> String {
    core.read_all_registers_json()
        .await
        .unwrap_or_else(|| String::from("{}"))
}

fn get_all_monitored_registers_latest_values(core: &GatewayCore) -> String {
    let catalog = core.catalog();
    let mut batch = PublishBatch::new(GETTER_JSON_MAX);

    for index in 0..catalog.count() {
        let Some(desc) = catalog.at(index) else {
            return String::from("{}");
        };
        if !desc.monitored {
            continue;
        }
        let time = catalog.latest_published_time_at(index).unwrap_or(0);
        let value = catalog.latest_published_value_at(index).unwrap_or("");
        let value = if time == 0 || value.is_empty() {
            "null"
        } else {
            value
        };
        if !batch.append(&desc.name, value) {
            return String::from("{}");
        }
    }

    batch.finish().unwrap_or_else(|| String::from("{}"))
}

// ============================================================================
// Registration
// ============================================================================

/// Register every command and getter on the transport, binding them to
/// the gateway instance.
pub(crate) fn register_callbacks(core: &Arc<GatewayCore>) {
    let transport = Arc::clone(core.transport());

    macro_rules! command {
        ($name:literal, $handler:ident) => {{
            let core = Arc::clone(core);
            transport.register_command(
                $name,
                Box::new(move |args| {
                    let core = Arc::clone(&core);
                    Box::pin(async move { $handler(&core, &args) })
                }),
            );
        }};
        ($name:literal, async $handler:ident) => {{
            let core = Arc::clone(core);
            transport.register_command(
                $name,
                Box::new(move |args| {
                    let core = Arc::clone(&core);
                    Box::pin(async move { $handler(&core, &args).await })
                }),
            );
        }};
    }

    macro_rules! getter {
        ($name:literal, $handler:ident) => {{
            let core = Arc::clone(core);
            transport.register_getter(
                $name,
                Box::new(move |args| {
                    let core = Arc::clone(&core);
                    let _ = &args;
                    Box::pin(async move { $handler(&core) })
                }),
            );
        }};
        ($name:literal, args $handler:ident) => {{
            let core = Arc::clone(core);
            transport.register_getter(
                $name,
                Box::new(move |args| {
                    let core = Arc::clone(&core);
                    Box::pin(async move { $handler(&core, &args) })
                }),
            );
        }};
        ($name:literal, async $handler:ident) => {{
            let core = Arc::clone(core);
            transport.register_getter(
                $name,
                Box::new(move |args| {
                    let core = Arc::clone(&core);
                    Box::pin(async move { $handler(&core).await })
                }),
            );
        }};
        ($name:literal, async args $handler:ident) => {{
            let core = Arc::clone(core);
            transport.register_getter(
                $name,
                Box::new(move |args| {
                    let core = Arc::clone(&core);
                    Box::pin(async move { $handler(&core, &args).await })
                }),
            );
        }};
    }

    command!("AddRegister", post_add_register);
    command!("DeleteRegister", post_delete_register);
    command!("MonitorRegister", post_monitor_register);
    command!("EnableMonitorOnChange", post_enable_monitor_on_change);
    command!(
        "SetRegisterChangeCheckInterval",
        post_set_register_change_check_interval
    );
    command!("SetRegisterMaxPublishDelay", post_set_register_max_publish_delay);
    command!("MakeRegisterWritable", post_make_register_writable);
    command!("MakeRegisterSigned", post_make_register_signed);
    command!("WriteRegisterValue", async post_write_register_value);
    command!("WriteRawRegisterValue", async post_write_raw_register_value);
    command!("SetRegisterCoefficients", post_set_register_coefficients);
    command!("SetRegisterDecimals", post_set_register_decimals);
    command!("SetRegisterLength", post_set_register_length);
    command!("SetMbConfig", post_set_mb_config);
    command!("SetMbInterCmdsDelayMs", post_set_mb_inter_cmds_delay_ms);
    command!("SetMbReadPeriod", post_set_mb_read_period);
    command!("SetMbWordOrder", post_set_mb_word_order);
    command!("SaveConfigToFlash", post_save_config_to_flash);

    getter!("GetRegistersList", get_registers_list);
    getter!("GetRegisterDetails", args get_register_details);
    getter!("ReadRegisterValue", async args get_read_register_value);
    getter!("ReadRawRegisterValue", async args get_read_raw_register_value);
    getter!("ReadAllRegistersValues", async get_read_all_registers_values);
    getter!(
        "GetAllMonitoredRegistersLatestValues",
        get_all_monitored_registers_latest_values
    );
    getter!("GetRegisterNameByMbDetails", args get_register_name_by_mb_details);
    getter!("GetActualModbusConfig", get_actual_modbus_config);
    getter!("GetNextModbusConfig", get_next_modbus_config);
}
