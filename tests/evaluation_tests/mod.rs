mod coordinator_test;
mod dispatcher_test;
mod playground_test;
